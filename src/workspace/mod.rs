//! Read-only access to the agent workspace that holds identity documents.
//!
//! Documents are addressed by plain file name (e.g. `SOUL.md`) relative to
//! the workspace root. Reads are never cached: every call goes to disk so a
//! hash always reflects the bytes present at call time.
//!
//! Security posture:
//! - Names containing path separators or `..` are rejected.
//! - Symlinks are refused; a linked document reads as an error, not as
//!   the link target.

use std::io;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Source of raw document bytes.
///
/// `read` must return an error of kind [`io::ErrorKind::NotFound`] for an
/// absent document so callers can tell absence from unreadability.
pub trait DocumentStore {
    fn read(&self, name: &str) -> io::Result<Vec<u8>>;

    /// Whether the store itself is reachable. A store that is gone must not
    /// read as a set of missing documents.
    fn ensure_available(&self) -> io::Result<()> {
        Ok(())
    }
}

/// A workspace directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspace at `root`, which must be an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let ws = Self::new(root);
        ws.ensure_available().map_err(|e| {
            ConfigError::invalid("workspace", format!("{}: {e}", ws.root.display()))
        })?;
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `name` is a bare file name that stays inside the workspace.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains('/')
            && !name.contains('\\')
    }
}

impl DocumentStore for Workspace {
    fn ensure_available(&self) -> io::Result<()> {
        let meta = std::fs::metadata(&self.root)?;
        if !meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("workspace is not a directory: {}", self.root.display()),
            ));
        }
        Ok(())
    }

    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        if !Self::is_valid_name(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("document name escapes workspace: {name}"),
            ));
        }

        let path = self.root.join(name);
        // symlink_metadata does not follow links; NotFound propagates as-is.
        let meta = path.symlink_metadata()?;
        if meta.file_type().is_symlink() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("refusing to read symlinked document: {}", path.display()),
            ));
        }

        std::fs::read(&path)
    }
}
