//! Per-tile fetch outcomes and their summary

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use url::Url;

use crate::app::tiles::TileId;
use crate::errors::FetchResult;

/// Files staged from one archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTile {
    /// Names written to the workspace
    pub files: Vec<String>,
    /// Size of the downloaded archive
    pub archive_bytes: u64,
}

/// Result of fetching one tile
#[derive(Debug)]
pub struct TileOutcome {
    /// Tile identifier
    pub tile_id: TileId,
    /// Dataset name the tile was requested from
    pub dataset: String,
    /// Download URL, absent for unresolved datasets
    pub url: Option<Url>,
    /// Staged files, or why the tile failed
    pub result: FetchResult<StagedTile>,
    /// Wall time spent on this tile
    pub elapsed: Duration,
}

impl TileOutcome {
    /// Whether the tile was staged
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcome of a whole fetch phase
#[derive(Debug)]
pub struct FetchSummary {
    /// Per-tile outcomes, in tile identifier order
    pub outcomes: Vec<TileOutcome>,
    /// When the fetch phase started
    pub started_at: DateTime<Utc>,
    /// Total time taken
    pub duration: Duration,
}

impl FetchSummary {
    /// Build a summary, ordering outcomes by tile identifier
    pub fn new(mut outcomes: Vec<TileOutcome>, started_at: DateTime<Utc>, duration: Duration) -> Self {
        outcomes.sort_by(|a, b| a.tile_id.cmp(&b.tile_id));
        Self {
            outcomes,
            started_at,
            duration,
        }
    }

    /// Number of tiles attempted or reported
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of tiles staged
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of tiles that failed
    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Whether every tile was staged
    pub fn is_complete(&self) -> bool {
        self.failed() == 0
    }

    /// Failed outcomes
    pub fn failures(&self) -> impl Iterator<Item = &TileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Failed tiles a re-run could still stage
    pub fn retryable(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Err(e) if e.is_transient()))
            .count()
    }

    /// Failure counts keyed by failure kind
    pub fn failures_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            if let Err(e) = &outcome.result {
                *counts.entry(e.kind()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Total archive bytes downloaded
    pub fn total_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(|staged| staged.archive_bytes)
            .sum()
    }

    /// Every file name staged by successful tiles
    pub fn staged_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .flat_map(|staged| staged.files.iter().cloned())
            .collect();
        files.sort();
        files
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        let started = self.started_at.format("%H:%M:%S UTC");
        if self.is_complete() {
            format!(
                "Fetched {} tiles ({}) in {:.1}s from {}",
                self.succeeded(),
                format_bytes(self.total_bytes()),
                self.duration.as_secs_f64(),
                started
            )
        } else {
            let kinds: Vec<String> = self
                .failures_by_kind()
                .into_iter()
                .map(|(kind, count)| format!("{} {}", count, kind))
                .collect();
            let mut line = format!(
                "Fetched {} of {} tiles in {:.1}s from {}; {} failed ({})",
                self.succeeded(),
                self.total(),
                self.duration.as_secs_f64(),
                started,
                self.failed(),
                kinds.join(", ")
            );
            if self.retryable() > 0 {
                line.push_str(&format!("; {} may succeed on a re-run", self.retryable()));
            }
            line
        }
    }
}

/// Format a byte count in human-readable units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
