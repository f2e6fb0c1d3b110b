//! Directory-backed workspace

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use super::{validate_name, Workspace};
use crate::errors::{WorkspaceError, WorkspaceResult};

/// Suffix for partially written entries
const PARTIAL_SUFFIX: &str = ".part";

/// Distinguishes concurrent writes of the same entry
static WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Workspace stored as the immediate children of one directory
#[derive(Debug, Clone)]
pub struct DirWorkspace {
    root: PathBuf,
}

impl DirWorkspace {
    /// Open a workspace, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceError::NotADirectory` if the path exists as a file, or an
    /// I/O error if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> WorkspaceResult<Self> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(WorkspaceError::NotADirectory { path: root });
        }
        if !root.exists() {
            fs::create_dir_all(&root).map_err(|source| WorkspaceError::Io {
                path: root.clone(),
                source,
            })?;
            debug!("Created staging directory: {}", root.display());
        }
        Ok(Self { root })
    }

    /// Workspace directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> WorkspaceResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

fn io_error(path: &Path, source: io::Error) -> WorkspaceError {
    if source.kind() == io::ErrorKind::NotFound {
        WorkspaceError::NotFound {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        }
    } else {
        WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl Workspace for DirWorkspace {
    fn list(&self) -> WorkspaceResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_error(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.root, e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> WorkspaceResult<Vec<u8>> {
        let path = self.entry_path(name)?;
        fs::read(&path).map_err(|e| io_error(&path, e))
    }

    fn add(&self, name: &str, contents: &[u8]) -> WorkspaceResult<()> {
        let final_path = self.entry_path(name)?;
        let sequence = WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let temp_path = self
            .root
            .join(format!("{}.{}{}", name, sequence, PARTIAL_SUFFIX));

        fs::write(&temp_path, contents).map_err(|e| io_error(&temp_path, e))?;
        if let Err(e) = fs::rename(&temp_path, &final_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_error(&final_path, e));
        }
        Ok(())
    }

    fn remove(&self, name: &str) -> WorkspaceResult<()> {
        let path = self.entry_path(name)?;
        let metadata = fs::symlink_metadata(&path).map_err(|e| io_error(&path, e))?;
        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| io_error(&path, e))
    }

    fn local_path(&self, name: &str) -> Option<PathBuf> {
        self.entry_path(name).ok()
    }

    fn contains(&self, name: &str) -> WorkspaceResult<bool> {
        Ok(self.entry_path(name)?.exists())
    }
}
