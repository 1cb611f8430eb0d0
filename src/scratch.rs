//! Per-run scratch directory and cooperative cancellation.
//!
//! Every run gets a uniquely named directory for exchange artifacts. The
//! directory is never removed implicitly: it survives failures for
//! inspection and successes until the caller invokes cleanup, which is
//! explicit and idempotent.

use crate::error::LinkageError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A uniquely named scratch directory, `xwalk-<pid>-<nonce>`, created under
/// the configured root (platform temp directory by default).
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create the directory. Concurrent runs get distinct directories; the
    /// pid prefix plus random suffix keeps them from colliding.
    pub fn create(root: Option<&Path>) -> Result<Self, LinkageError> {
        let parent = match root {
            Some(root) => root.to_path_buf(),
            None => std::env::temp_dir(),
        };
        std::fs::create_dir_all(&parent).map_err(|e| LinkageError::WriteFailed {
            path: parent.clone(),
            message: e.to_string(),
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("xwalk-{}-", std::process::id()))
            .tempdir_in(&parent)
            .map_err(|e| LinkageError::WriteFailed {
                path: parent.clone(),
                message: e.to_string(),
            })?;
        // keep() disarms auto-deletion; lifetime is managed by cleanup().
        Ok(Self { path: dir.keep() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory and everything in it. Safe to call repeatedly;
    /// an already-removed directory is not an error.
    pub fn cleanup(&self) -> Result<(), LinkageError> {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LinkageError::WriteFailed {
                path: self.path.clone(),
                message: e.to_string(),
            }),
        }
    }
}

/// Cooperative cancellation handle shared between a run and its caller.
///
/// Cloning yields another handle to the same flag. Cancellation is checked
/// at stage boundaries; a run never advances past a pending match once the
/// flag is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_dir_is_created_and_uniquely_named() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchDir::create(Some(root.path())).unwrap();
        let b = ScratchDir::create(Some(root.path())).unwrap();
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
        assert_ne!(a.path(), b.path());
        let name = a.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("xwalk-{}-", std::process::id())));
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(Some(root.path())).unwrap();
        std::fs::write(scratch.file("corpus.csv"), "x\n").unwrap();

        scratch.cleanup().unwrap();
        assert!(!scratch.path().exists());
        // Second cleanup of a missing directory is still Ok.
        scratch.cleanup().unwrap();
    }

    #[test]
    fn test_scratch_survives_until_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let path = {
            let scratch = ScratchDir::create(Some(root.path())).unwrap();
            scratch.path().to_path_buf()
        };
        // Dropping the handle must not delete the directory.
        assert!(path.is_dir());
    }

    #[test]
    fn test_cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
