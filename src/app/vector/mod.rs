//! Vector intersector
//!
//! Loads the tile index and area-of-interest layers, checks that they declare the
//! same CRS, and overlays them. The overlay result is the only input the rest of
//! the workflow needs from the vector side.

pub mod crs;
pub mod layer;
pub mod overlay;

use std::path::Path;

use tracing::info;

use crate::errors::{InputError, InputResult};

pub use crs::Crs;
pub use layer::{Properties, VectorFeature, VectorFormat, VectorLayer};
pub use overlay::{overlay, Intersection, IntersectionRecord};

/// Open both layers and intersect them
///
/// # Errors
///
/// Returns `InputError` if either layer cannot be loaded, the CRSs differ, or
/// the area of interest misses every tile.
pub fn intersect_layers(index_path: &Path, aoi_path: &Path) -> InputResult<Intersection> {
    let index = VectorLayer::open(index_path)?;
    let aoi = VectorLayer::open(aoi_path)?;
    intersect(&index, &aoi)
}

/// Intersect two loaded layers, treating an empty result as an error
pub fn intersect(index: &VectorLayer, aoi: &VectorLayer) -> InputResult<Intersection> {
    if !index.crs.is_specified() && !aoi.crs.is_specified() {
        tracing::warn!("Neither input layer declares a CRS; assuming they match");
    }

    let intersection = overlay(index, aoi)?;
    if intersection.is_empty() {
        return Err(InputError::EmptyIntersection);
    }

    info!(
        "{} of {} index records intersect the area of interest",
        intersection.len(),
        index.len()
    );
    Ok(intersection)
}
