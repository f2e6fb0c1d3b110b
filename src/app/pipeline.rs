//! Workflow driver
//!
//! Runs the stages in order: intersect, resolve tiles, resolve URLs, clear the
//! staging workspace, fetch, prune, merge. Input and resolution errors stop the
//! run before any network or workspace activity. Per-tile fetch failures are
//! collected in the [`FetchSummary`] and the run continues to the merge, which
//! fails with the expected and staged file lists if nothing usable remains.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::catalog::{unresolved_datasets, Catalog, TileUrl};
use crate::app::client::ArchiveSource;
use crate::app::fetcher::{fetch_all, FetchConfig, FetchEvent, FetchSummary};
use crate::app::raster::{merge_files, merge_workspace, MergeConfig, MergeReport};
use crate::app::tiles::TileSet;
use crate::app::vector::{intersect_layers, Intersection};
use crate::app::workspace::{clear, prune, ClearReport, PruneReport, Workspace};
use crate::constants::{files, vector};
use crate::errors::{AppError, ResolveError, Result};

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPaths {
    /// Tile index layer
    pub index: PathBuf,
    /// Area of interest layer
    pub aoi: PathBuf,
    /// Where the intersection layer is written
    pub intersection_output: PathBuf,
    /// Staging directory
    pub staging_dir: PathBuf,
    /// Merged raster
    pub merged_output: PathBuf,
}

impl Default for WorkflowPaths {
    fn default() -> Self {
        Self {
            index: PathBuf::from("tile_index.shp"),
            aoi: PathBuf::from("aoi.geojson"),
            intersection_output: PathBuf::from(files::INTERSECTION_FILE),
            staging_dir: PathBuf::from(files::STAGING_DIR),
            merged_output: PathBuf::from(files::MERGED_FILE),
        }
    }
}

/// How tile index attributes are interpreted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFields {
    /// Attribute naming the dataset directory
    pub dataset: String,
    /// Attribute naming the tile file
    pub tile_name: String,
    /// Extension appended to tile names to form staged file names
    pub extension: String,
}

impl Default for TileFields {
    fn default() -> Self {
        Self {
            dataset: vector::DATASET_FIELD.to_string(),
            tile_name: vector::TILE_NAME_FIELD.to_string(),
            extension: files::TILE_EXTENSION.to_string(),
        }
    }
}

/// Everything the workflow needs besides its I/O endpoints
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    pub paths: WorkflowPaths,
    pub fields: TileFields,
    pub catalog: Catalog,
    pub fetch: FetchConfig,
    pub merge: MergeConfig,
    /// Let tiles from unknown datasets through as per-tile fetch failures
    pub allow_unresolved: bool,
}

/// Tiles and URLs derived from the vector inputs
#[derive(Debug, Clone)]
pub struct Plan {
    pub intersection: Intersection,
    pub tiles: TileSet,
    pub urls: Vec<TileUrl>,
}

impl Plan {
    /// Dataset names missing from the catalog
    pub fn unresolved(&self) -> Vec<String> {
        unresolved_datasets(&self.urls)
    }
}

/// Outcome of a complete run
#[derive(Debug)]
pub struct WorkflowReport {
    pub plan: Plan,
    pub cleared: ClearReport,
    pub fetch: FetchSummary,
    pub prune: PruneReport,
    pub merge: MergeReport,
}

impl Workflow {
    /// Intersect the inputs and resolve every tile, without side effects
    ///
    /// # Errors
    ///
    /// Any input or tile identifier error. Unknown datasets are not an error
    /// here; they appear as unresolved URLs.
    pub fn plan(&self) -> Result<Plan> {
        let intersection = intersect_layers(&self.paths.index, &self.paths.aoi)?;
        let tiles = TileSet::from_intersection(
            &intersection,
            &self.fields.dataset,
            &self.fields.tile_name,
            &self.fields.extension,
        )?;
        let urls = self.catalog.resolve_all(&tiles)?;

        info!(
            "Planned {} tiles from {} intersected records across {} datasets",
            tiles.len(),
            intersection.len(),
            tiles.datasets().len()
        );
        Ok(Plan {
            intersection,
            tiles,
            urls,
        })
    }

    /// Plan, then refuse to continue if any dataset is unresolved and that is not allowed
    fn checked_plan(&self) -> Result<Plan> {
        let plan = self.plan()?;
        let unresolved = plan.unresolved();
        if !unresolved.is_empty() {
            if !self.allow_unresolved {
                return Err(ResolveError::UnresolvedDatasets { names: unresolved }.into());
            }
            warn!(
                "Continuing with unresolved datasets {:?}; their tiles will fail",
                unresolved
            );
        }
        Ok(plan)
    }

    /// Run every stage
    ///
    /// Archives come from `source` and are staged in `workspace`. Fetch progress
    /// goes to `events` when given.
    pub async fn run(
        &self,
        source: &dyn ArchiveSource,
        workspace: Arc<dyn Workspace>,
        events: Option<mpsc::Sender<FetchEvent>>,
    ) -> Result<WorkflowReport> {
        let plan = self.checked_plan()?;

        plan.intersection
            .to_layer("intersection")
            .write_geojson(&self.paths.intersection_output)?;
        info!(
            "Wrote intersection to {}",
            self.paths.intersection_output.display()
        );

        let cleared = clear(workspace.as_ref())?;
        let fetch = fetch_all(
            plan.urls.clone(),
            source,
            Arc::clone(&workspace),
            &self.fetch,
            events,
        )
        .await;

        let prune = prune(workspace.as_ref(), plan.tiles.expected_files())?;
        if !prune.is_exact() {
            warn!(
                "Staging holds {} of {} expected tiles",
                prune.kept.len(),
                plan.tiles.expected_files().len()
            );
        }

        let expected: Vec<String> = plan.tiles.expected_files().iter().cloned().collect();
        let kept = prune.kept.clone();
        let merge_config = self.merge.clone();
        let output = self.paths.merged_output.clone();
        let merge_workspace = Arc::clone(&workspace);
        let staged = kept.clone();
        let merge = tokio::task::spawn_blocking(move || {
            merge_files(merge_workspace.as_ref(), &kept, &merge_config, &output)
        })
        .await
        .map_err(|e| AppError::generic(format!("Merge task failed: {}", e)))?
        .map_err(|e| AppError::merge(e, expected, staged))?;

        Ok(WorkflowReport {
            plan,
            cleared,
            fetch,
            prune,
            merge,
        })
    }

    /// Merge whatever is already staged
    pub fn merge_staged(&self, workspace: &dyn Workspace) -> Result<MergeReport> {
        merge_workspace(workspace, &self.merge, &self.paths.merged_output).map_err(|e| {
            let staged = workspace.list().unwrap_or_default();
            AppError::merge(e, Vec::new(), staged)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::MemorySource;
    use crate::app::workspace::MemoryWorkspace;
    use crate::errors::MergeError;
    use tempfile::TempDir;

    const INDEX: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"dirname": "mystery-county-2001", "demname": "abc1234567dem"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}
    ]}"#;
    const AOI: &str = r#"{"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}"#;

    fn workflow(dir: &TempDir) -> Workflow {
        let index = dir.path().join("index.geojson");
        let aoi = dir.path().join("aoi.geojson");
        std::fs::write(&index, INDEX).unwrap();
        std::fs::write(&aoi, AOI).unwrap();
        Workflow {
            paths: WorkflowPaths {
                index,
                aoi,
                intersection_output: dir.path().join("intersection.geojson"),
                staging_dir: dir.path().join("staging"),
                merged_output: dir.path().join("merged.tif"),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_reports_unresolved_datasets() {
        let dir = TempDir::new().unwrap();
        let plan = workflow(&dir).plan().unwrap();
        assert_eq!(plan.tiles.len(), 1);
        assert_eq!(plan.unresolved(), vec!["mystery-county-2001"]);
        assert!(!dir.path().join("intersection.geojson").exists());
    }

    #[tokio::test]
    async fn test_unresolved_dataset_stops_before_fetching() {
        let dir = TempDir::new().unwrap();
        let workflow = workflow(&dir);
        let source = MemorySource::new();
        let workspace = Arc::new(MemoryWorkspace::new());
        workspace.add("leftover.img", b"old").unwrap();

        let err = workflow
            .run(&source, workspace.clone(), None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::Resolve(ResolveError::UnresolvedDatasets { .. })
        ));
        assert_eq!(source.total_attempts(), 0);
        // The workspace was not cleared
        assert!(workspace.contains("leftover.img").unwrap());
    }

    #[tokio::test]
    async fn test_allowed_unresolved_fails_at_merge_with_context() {
        let dir = TempDir::new().unwrap();
        let workflow = Workflow {
            allow_unresolved: true,
            ..workflow(&dir)
        };
        let source = MemorySource::new();
        let workspace = Arc::new(MemoryWorkspace::new());

        let err = workflow
            .run(&source, workspace, None)
            .await
            .unwrap_err();

        match err {
            AppError::Merge {
                source: MergeError::NoInput { .. },
                expected,
                staged,
            } => {
                assert_eq!(expected, vec!["abc1234567dem.img"]);
                assert!(staged.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(source.total_attempts(), 0);
    }
}
