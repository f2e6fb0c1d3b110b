//! Concurrent tile fetcher
//!
//! Downloads every tile archive through an [`ArchiveSource`] with a bounded
//! number of requests in flight, and unpacks each archive into the staging
//! workspace. Tiles complete in any order. Every tile yields a [`TileOutcome`];
//! one tile failing never stops the others.
//!
//! Two time limits apply: the per-request timeout configured on the HTTP client,
//! and an optional overall budget. When the budget runs out, in-flight downloads
//! are abandoned and tiles not yet started are reported as
//! [`FetchError::BudgetExhausted`]. Archives already downloaded are still unpacked.

pub mod archive;
pub mod stats;

use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::app::catalog::TileUrl;
use crate::app::client::ArchiveSource;
use crate::app::tiles::TileId;
use crate::app::workspace::Workspace;
use crate::constants::workers;
use crate::errors::{FetchError, FetchResult};

pub use archive::extract_archive;
pub use stats::{format_bytes, FetchSummary, StagedTile, TileOutcome};

/// Fetch phase settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Maximum number of tiles in flight
    pub pool_size: usize,
    /// Overall time allowed for the fetch phase
    pub budget: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            pool_size: workers::DEFAULT_POOL_SIZE,
            budget: Some(workers::DEFAULT_FETCH_BUDGET),
        }
    }
}

/// Progress notifications emitted while fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// Fetch phase is starting with this many tiles
    Queued { total: usize },
    /// A tile download started
    Started { tile_id: TileId },
    /// A tile was staged
    Staged { tile_id: TileId, bytes: u64 },
    /// A tile failed
    Failed {
        tile_id: TileId,
        kind: &'static str,
        message: String,
    },
}

/// Fetch and stage every tile
///
/// Unresolved tiles are reported as `FetchError::Unresolved` without touching
/// the source. Progress events go to `events` when a channel is given; a closed
/// channel is ignored.
pub async fn fetch_all(
    tiles: Vec<TileUrl>,
    source: &dyn ArchiveSource,
    workspace: Arc<dyn Workspace>,
    config: &FetchConfig,
    events: Option<mpsc::Sender<FetchEvent>>,
) -> FetchSummary {
    let started_at = Utc::now();
    let clock = StdInstant::now();
    let deadline = config.budget.map(|budget| Instant::now() + budget);
    let pool_size = config.pool_size.max(1);

    info!(
        "Fetching {} tiles with {} concurrent downloads",
        tiles.len(),
        pool_size
    );
    emit(&events, FetchEvent::Queued { total: tiles.len() }).await;

    let outcomes: Vec<TileOutcome> = stream::iter(tiles)
        .map(|tile| {
            let workspace = Arc::clone(&workspace);
            let events = events.clone();
            async move { fetch_tile(tile, source, workspace, deadline, events).await }
        })
        .buffer_unordered(pool_size)
        .collect()
        .await;

    let summary = FetchSummary::new(outcomes, started_at, clock.elapsed());
    if summary.is_complete() {
        info!("{}", summary.summary());
    } else {
        warn!("{}", summary.summary());
    }
    summary
}

async fn fetch_tile(
    tile: TileUrl,
    source: &dyn ArchiveSource,
    workspace: Arc<dyn Workspace>,
    deadline: Option<Instant>,
    events: Option<mpsc::Sender<FetchEvent>>,
) -> TileOutcome {
    let clock = StdInstant::now();

    let (tile_id, dataset, url, result) = match tile {
        TileUrl::Unresolved {
            tile_id,
            dataset_name,
        } => {
            let result = Err(FetchError::Unresolved {
                dataset: dataset_name.clone(),
            });
            (tile_id, dataset_name, None, result)
        }
        TileUrl::Resolved {
            tile_id,
            dataset,
            url,
        } => {
            let result = if deadline.is_some_and(|d| Instant::now() >= d) {
                Err(FetchError::BudgetExhausted)
            } else {
                emit(
                    &events,
                    FetchEvent::Started {
                        tile_id: tile_id.clone(),
                    },
                )
                .await;
                download_and_stage(source, &url, workspace, deadline).await
            };
            (tile_id, dataset.dirname().to_string(), Some(url), result)
        }
    };

    match &result {
        Ok(staged) => {
            debug!(tile = %tile_id, files = staged.files.len(), "Tile staged");
            emit(
                &events,
                FetchEvent::Staged {
                    tile_id: tile_id.clone(),
                    bytes: staged.archive_bytes,
                },
            )
            .await;
        }
        Err(e) => {
            warn!(tile = %tile_id, kind = e.kind(), "Tile failed: {}", e);
            emit(
                &events,
                FetchEvent::Failed {
                    tile_id: tile_id.clone(),
                    kind: e.kind(),
                    message: e.to_string(),
                },
            )
            .await;
        }
    }

    TileOutcome {
        tile_id,
        dataset,
        url,
        result,
        elapsed: clock.elapsed(),
    }
}

/// Download one archive within the budget, then unpack it
///
/// Only the download counts against the budget. Once an archive has arrived its
/// extraction runs to completion, so nothing is written to the workspace after
/// [`fetch_all`] returns.
async fn download_and_stage(
    source: &dyn ArchiveSource,
    url: &Url,
    workspace: Arc<dyn Workspace>,
    deadline: Option<Instant>,
) -> FetchResult<StagedTile> {
    let bytes = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, source.fetch(url))
            .await
            .unwrap_or(Err(FetchError::BudgetExhausted))?,
        None => source.fetch(url).await?,
    };
    let archive_bytes = bytes.len() as u64;

    let files = tokio::task::spawn_blocking(move || extract_archive(&bytes, workspace.as_ref()))
        .await
        .map_err(|e| FetchError::TaskFailed {
            reason: e.to_string(),
        })??;

    Ok(StagedTile {
        files,
        archive_bytes,
    })
}

async fn emit(events: &Option<mpsc::Sender<FetchEvent>>, event: FetchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
