//! Core application logic for DEM Harvest
//!
//! This module contains the workflow stages (vector intersection, tile and URL
//! resolution, staging workspace, concurrent fetch, raster merge) and the driver
//! that runs them in order.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dem_harvest::app::{DirWorkspace, TnrisClient, Workflow};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let workflow = Workflow::default();
//! let client = TnrisClient::new()?;
//! let workspace = Arc::new(DirWorkspace::create(&workflow.paths.staging_dir)?);
//!
//! let report = workflow.run(&client, workspace, None).await?;
//! println!("Merged {} tiles into {}", report.merge.sources.len(), report.merge.output.display());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod client;
pub mod fetcher;
pub mod pipeline;
pub mod raster;
pub mod tiles;
pub mod vector;
pub mod workspace;

// Re-export main public API
pub use catalog::{unresolved_datasets, Catalog, TileUrl, TnrisDataset};
pub use client::{ArchiveSource, ClientConfig, MemorySource, TnrisClient};
pub use fetcher::{fetch_all, FetchConfig, FetchEvent, FetchSummary, TileOutcome};
pub use pipeline::{Plan, TileFields, Workflow, WorkflowPaths, WorkflowReport};
pub use raster::{merge_tiles, merge_workspace, MergeConfig, MergeReport, RasterTile};
pub use tiles::{extract_tile_id, TileId, TileSet};
pub use vector::{intersect_layers, Crs, Intersection, VectorLayer};
pub use workspace::{clear, prune, DirWorkspace, MemoryWorkspace, PruneReport, Workspace};
