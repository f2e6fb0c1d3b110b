//! Prelude module for DEM Harvest Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use dem_harvest::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dem_harvest::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let (workflow, client_config) = AppConfig::default().to_runtime_config()?;
//!     let client = TnrisClient::with_config(client_config)?;
//!     let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir)?);
//!
//!     let report = workflow.run(&client, workspace, None).await?;
//!     println!("{}", report.fetch.summary());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Workflow and its configuration
pub use crate::app::{
    ClientConfig, FetchConfig, MergeConfig, Plan, TileFields, Workflow, WorkflowPaths,
    WorkflowReport,
};
pub use crate::config::AppConfig;

// Stage building blocks
pub use crate::app::{
    ArchiveSource, Catalog, DirWorkspace, FetchSummary, MemorySource, MemoryWorkspace,
    MergeReport, TileId, TileSet, TileUrl, TnrisClient, TnrisDataset, Workspace,
};
