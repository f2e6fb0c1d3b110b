//! Workspace pruning
//!
//! Archives unpack sidecar files (`.xml`, `.rrd`, world files) next to the tile
//! raster. Only entries whose names exactly match an expected tile file survive.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::Workspace;
use crate::errors::WorkspaceResult;

/// Outcome of pruning the staging workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Expected entries that were present and kept
    pub kept: Vec<String>,
    /// Unexpected entries that were deleted
    pub removed: Vec<String>,
    /// Unexpected entries that could not be deleted, with the reason
    pub failed: Vec<(String, String)>,
    /// Expected entries that were never staged
    pub missing: Vec<String>,
}

impl PruneReport {
    /// Whether the workspace now holds exactly the expected entries
    pub fn is_exact(&self) -> bool {
        self.failed.is_empty() && self.missing.is_empty()
    }
}

/// Delete every entry whose name is not in `expected`
///
/// Removal failures are logged and recorded, never returned. Only a failure to
/// list the workspace is an error.
pub fn prune(workspace: &dyn Workspace, expected: &BTreeSet<String>) -> WorkspaceResult<PruneReport> {
    let mut report = PruneReport::default();
    let staged = workspace.list()?;

    for name in &staged {
        if expected.contains(name) {
            report.kept.push(name.clone());
            continue;
        }
        match workspace.remove(name) {
            Ok(()) => {
                debug!("Pruned {}", name);
                report.removed.push(name.clone());
            }
            Err(e) => {
                warn!("Could not prune {}: {}", name, e);
                report.failed.push((name.clone(), e.to_string()));
            }
        }
    }

    let staged: BTreeSet<&String> = staged.iter().collect();
    report.missing = expected
        .iter()
        .filter(|name| !staged.contains(name))
        .cloned()
        .collect();

    if !report.missing.is_empty() {
        warn!(
            "{} expected tile file(s) were not staged: {:?}",
            report.missing.len(),
            report.missing
        );
    }
    info!(
        "Pruned staging workspace: {} kept, {} removed, {} failed",
        report.kept.len(),
        report.removed.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::workspace::MemoryWorkspace;

    fn expected(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_prune_keeps_exactly_expected() {
        let workspace = MemoryWorkspace::new();
        for name in [
            "abc1234567dem.img",
            "abc1234567dem.img.aux.xml",
            "abc1234567dem.rrd",
            "xyz7654321dem.img",
            "readme.txt",
        ] {
            workspace.add(name, b"x").unwrap();
        }

        let report = prune(
            &workspace,
            &expected(&["abc1234567dem.img", "xyz7654321dem.img"]),
        )
        .unwrap();

        assert_eq!(
            workspace.list().unwrap(),
            vec!["abc1234567dem.img".to_string(), "xyz7654321dem.img".to_string()]
        );
        assert_eq!(report.kept.len(), 2);
        assert_eq!(report.removed.len(), 3);
        assert!(report.is_exact());
    }

    #[test]
    fn test_prune_is_case_sensitive() {
        let workspace = MemoryWorkspace::new();
        workspace.add("TILE1234567.IMG", b"x").unwrap();
        let report = prune(&workspace, &expected(&["TILE1234567.img"])).unwrap();
        assert_eq!(report.removed, vec!["TILE1234567.IMG".to_string()]);
        assert_eq!(report.missing, vec!["TILE1234567.img".to_string()]);
        assert!(!report.is_exact());
    }

    #[test]
    fn test_prune_continues_after_failed_delete() {
        let workspace = MemoryWorkspace::new();
        workspace.add("keep1234567.img", b"x").unwrap();
        workspace.add("a.xml", b"x").unwrap();
        workspace.add("b.xml", b"x").unwrap();
        workspace.deny_removal("a.xml");

        let report = prune(&workspace, &expected(&["keep1234567.img"])).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.removed, vec!["b.xml".to_string()]);
        assert_eq!(
            workspace.list().unwrap(),
            vec!["a.xml".to_string(), "keep1234567.img".to_string()]
        );
    }
}
