//! Integration tests for DEM Harvest

mod pipeline;
