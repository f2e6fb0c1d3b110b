//! Staging workspace
//!
//! The staging directory is shared by three workflow steps: it is cleared before
//! downloading, filled by archive extraction, and pruned before the merge. The
//! [`Workspace`] trait makes that shared state an explicit value passed between
//! steps, with a directory-backed implementation for real runs and an in-memory
//! one for tests.
//!
//! # Module Organization
//!
//! - [`dir`] - Directory-backed workspace with temp-file + rename writes
//! - [`memory`] - In-memory workspace
//! - [`prune`] - Removal of everything that is not an expected tile

pub mod dir;
pub mod memory;
pub mod prune;

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::errors::{WorkspaceError, WorkspaceResult};

pub use dir::DirWorkspace;
pub use memory::MemoryWorkspace;
pub use prune::{prune, PruneReport};

/// Flat collection of named files used as the staging area
///
/// Implementations are synchronous; async callers run them on the blocking pool.
pub trait Workspace: Send + Sync + fmt::Debug {
    /// Entry names, sorted
    fn list(&self) -> WorkspaceResult<Vec<String>>;

    /// Read an entry
    fn read(&self, name: &str) -> WorkspaceResult<Vec<u8>>;

    /// Create or replace an entry
    fn add(&self, name: &str, contents: &[u8]) -> WorkspaceResult<()>;

    /// Remove an entry
    fn remove(&self, name: &str) -> WorkspaceResult<()>;

    /// On-disk location of an entry, for readers that need a real path
    fn local_path(&self, name: &str) -> Option<PathBuf>;

    /// Whether an entry exists
    fn contains(&self, name: &str) -> WorkspaceResult<bool> {
        Ok(self.list()?.iter().any(|entry| entry == name))
    }
}

/// Reject names that are empty or would leave the workspace
pub fn validate_name(name: &str) -> WorkspaceResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(WorkspaceError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Outcome of clearing a workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    /// Entries deleted
    pub removed: Vec<String>,
    /// Entries that could not be deleted, with the reason
    pub failed: Vec<(String, String)>,
}

impl ClearReport {
    /// Whether every entry was removed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Remove every entry from a workspace
///
/// A failed removal is logged and skipped; only a failure to list the workspace
/// is returned as an error.
pub fn clear(workspace: &dyn Workspace) -> WorkspaceResult<ClearReport> {
    let mut report = ClearReport::default();

    for name in workspace.list()? {
        match workspace.remove(&name) {
            Ok(()) => {
                debug!("Removed staged entry {}", name);
                report.removed.push(name);
            }
            Err(e) => {
                warn!("Could not remove staged entry {}: {}", name, e);
                report.failed.push((name, e.to_string()));
            }
        }
    }

    info!(
        "Cleared staging workspace: {} removed, {} failed",
        report.removed.len(),
        report.failed.len()
    );
    Ok(report)
}
