//! In-memory workspace

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::{validate_name, Workspace};
use crate::errors::{WorkspaceError, WorkspaceResult};

#[derive(Debug, Default)]
struct Entries {
    files: BTreeMap<String, Vec<u8>>,
    protected: BTreeSet<String>,
}

/// Workspace held entirely in memory
///
/// Entries can be marked as undeletable to exercise the log-and-continue paths
/// of clearing and pruning.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    entries: Mutex<Entries>,
}

impl MemoryWorkspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        Self::default()
    }

    /// Make removal of `name` fail with a permission error
    pub fn deny_removal(&self, name: &str) {
        self.lock().protected.insert(name.to_string());
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.lock().files.len()
    }

    /// Whether the workspace has no entries
    pub fn is_empty(&self) -> bool {
        self.lock().files.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Workspace for MemoryWorkspace {
    fn list(&self) -> WorkspaceResult<Vec<String>> {
        Ok(self.lock().files.keys().cloned().collect())
    }

    fn read(&self, name: &str) -> WorkspaceResult<Vec<u8>> {
        self.lock()
            .files
            .get(name)
            .cloned()
            .ok_or_else(|| WorkspaceError::NotFound {
                name: name.to_string(),
            })
    }

    fn add(&self, name: &str, contents: &[u8]) -> WorkspaceResult<()> {
        validate_name(name)?;
        self.lock().files.insert(name.to_string(), contents.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> WorkspaceResult<()> {
        let mut entries = self.lock();
        if entries.protected.contains(name) {
            return Err(WorkspaceError::Io {
                path: PathBuf::from(name),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "entry is protected"),
            });
        }
        entries
            .files
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| WorkspaceError::NotFound {
                name: name.to_string(),
            })
    }

    fn local_path(&self, _name: &str) -> Option<PathBuf> {
        None
    }

    fn contains(&self, name: &str) -> WorkspaceResult<bool> {
        Ok(self.lock().files.contains_key(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_read_remove() {
        let workspace = MemoryWorkspace::new();
        assert!(workspace.is_empty());

        workspace.add("b.img", b"second").unwrap();
        workspace.add("a.img", b"first").unwrap();
        assert_eq!(
            workspace.list().unwrap(),
            vec!["a.img".to_string(), "b.img".to_string()]
        );
        assert_eq!(workspace.read("a.img").unwrap(), b"first");
        assert!(workspace.contains("b.img").unwrap());

        workspace.remove("a.img").unwrap();
        assert_eq!(workspace.len(), 1);
        assert!(matches!(
            workspace.read("a.img"),
            Err(WorkspaceError::NotFound { .. })
        ));
        assert!(workspace.local_path("b.img").is_none());
    }

    #[test]
    fn test_denied_removal() {
        let workspace = MemoryWorkspace::new();
        workspace.add("locked.img", b"x").unwrap();
        workspace.deny_removal("locked.img");
        assert!(matches!(
            workspace.remove("locked.img"),
            Err(WorkspaceError::Io { .. })
        ));
        assert!(workspace.contains("locked.img").unwrap());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let workspace = MemoryWorkspace::new();
        assert!(matches!(
            workspace.add("../x", b""),
            Err(WorkspaceError::InvalidName { .. })
        ));
    }
}
