//! Fetch progress display
//!
//! Consumes [`FetchEvent`]s from the fetcher and drives an indicatif progress
//! bar. When stderr is not a terminal, or the bar is disabled, progress is
//! reported through the log instead.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app::fetcher::{format_bytes, FetchEvent};
use crate::constants::{progress, workers};

/// Counters accumulated while displaying progress
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTally {
    pub total: usize,
    pub staged: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl ProgressTally {
    /// Tiles that have finished either way
    pub fn finished(&self) -> usize {
        self.staged + self.failed
    }

    /// Fold one event into the counters
    pub fn record(&mut self, event: &FetchEvent) {
        match event {
            FetchEvent::Queued { total } => self.total = *total,
            FetchEvent::Started { .. } => {}
            FetchEvent::Staged { bytes, .. } => {
                self.staged += 1;
                self.bytes += bytes;
            }
            FetchEvent::Failed { .. } => self.failed += 1,
        }
    }
}

/// Progress display for the fetch phase
pub struct ProgressDisplay {
    enabled: bool,
}

impl ProgressDisplay {
    /// Create a display; the bar is shown only if enabled and stderr is a terminal
    pub fn new(enabled: bool) -> Self {
        let is_terminal = atty::is(atty::Stream::Stderr);
        Self {
            enabled: enabled && is_terminal,
        }
    }

    /// Channel for the fetcher plus the task rendering it
    ///
    /// The task ends when the sender side is dropped and returns the final tally.
    pub fn spawn(self) -> (mpsc::Sender<FetchEvent>, JoinHandle<ProgressTally>) {
        let (tx, rx) = mpsc::channel(workers::EVENT_BUFFER_SIZE);
        let handle = tokio::spawn(self.render(rx));
        (tx, handle)
    }

    async fn render(self, mut rx: mpsc::Receiver<FetchEvent>) -> ProgressTally {
        let mut tally = ProgressTally::default();
        let mut bar: Option<ProgressBar> = None;

        while let Some(event) = rx.recv().await {
            tally.record(&event);
            match &event {
                FetchEvent::Queued { total } => {
                    if self.enabled {
                        bar = Some(new_bar(*total as u64));
                    } else {
                        info!("Downloading {} tiles", total);
                    }
                }
                FetchEvent::Started { tile_id } => {
                    debug!(tile = %tile_id, "Download started");
                    if let Some(bar) = &bar {
                        bar.set_message(format!("tile {}", tile_id));
                    }
                }
                FetchEvent::Staged { tile_id, bytes } => match &bar {
                    Some(bar) => {
                        bar.inc(1);
                        bar.set_message(format!("staged {} ({})", tile_id, format_bytes(*bytes)));
                    }
                    None => info!(
                        "[{}/{}] staged tile {} ({})",
                        tally.finished(),
                        tally.total,
                        tile_id,
                        format_bytes(*bytes)
                    ),
                },
                FetchEvent::Failed {
                    tile_id,
                    kind,
                    message,
                } => match &bar {
                    Some(bar) => {
                        bar.inc(1);
                        bar.println(format!("✗ tile {} failed ({}): {}", tile_id, kind, message));
                    }
                    None => info!(
                        "[{}/{}] tile {} failed ({})",
                        tally.finished(),
                        tally.total,
                        tile_id,
                        kind
                    ),
                },
            }
        }

        if let Some(bar) = bar {
            bar.finish_with_message(format!(
                "{} staged, {} failed, {}",
                tally.staged,
                tally.failed,
                format_bytes(tally.bytes)
            ));
        }
        tally
    }
}

fn new_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(progress::TICK_MS));
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tiles::TileId;

    #[test]
    fn test_tally_counts_events() {
        let tile_id = TileId::parse("1234567").unwrap();
        let mut tally = ProgressTally::default();
        for event in [
            FetchEvent::Queued { total: 2 },
            FetchEvent::Started {
                tile_id: tile_id.clone(),
            },
            FetchEvent::Staged {
                tile_id: tile_id.clone(),
                bytes: 100,
            },
            FetchEvent::Failed {
                tile_id,
                kind: "http",
                message: "HTTP 404".into(),
            },
        ] {
            tally.record(&event);
        }

        assert_eq!(
            tally,
            ProgressTally {
                total: 2,
                staged: 1,
                failed: 1,
                bytes: 100
            }
        );
        assert_eq!(tally.finished(), 2);
    }

    #[tokio::test]
    async fn test_disabled_display_returns_tally() {
        let (tx, handle) = ProgressDisplay::new(false).spawn();
        tx.send(FetchEvent::Queued { total: 1 }).await.unwrap();
        tx.send(FetchEvent::Staged {
            tile_id: TileId::parse("7654321").unwrap(),
            bytes: 42,
        })
        .await
        .unwrap();
        drop(tx);

        let tally = handle.await.unwrap();
        assert_eq!(tally.staged, 1);
        assert_eq!(tally.bytes, 42);
    }
}
