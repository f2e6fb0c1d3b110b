//! DEM Harvest Library
//!
//! Builds a single elevation raster from the TNRIS LiDAR DEM tiles that cover an
//! area of interest: vector intersection, tile resolution, concurrent download,
//! pruning and raster merge.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
