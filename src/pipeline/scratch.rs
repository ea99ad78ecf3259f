//! Per-request scratch area for the upload and its preprocessed copy.
//!
//! Each scan owns a fresh directory under the configured scratch root. The
//! directory and both files inside it are removed when the [`ScratchSpace`]
//! is dropped: on success, on error, when a timeout cancels the request
//! future, or while unwinding from a panic.
//!
//! Preprocessing and Tesseract recognition run on the blocking pool and each
//! holds its own `Arc<ScratchSpace>`. Such a task cannot be cancelled: when a
//! scan times out mid-stage, the 504 is answered right away but the
//! directory stays on disk until the detached task returns, and is removed
//! then.
//!
//! Removal failures are logged and swallowed.

use crate::error::StockscanError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const ORIGINAL_NAME: &str = "upload.bin";
// Tesseract picks its decoder from the extension.
const PREPROCESSED_NAME: &str = "preprocessed.png";

/// Exclusively owned temp directory for one scan.
#[derive(Debug)]
pub struct ScratchSpace {
    original: PathBuf,
    preprocessed: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchSpace {
    /// Create a new scratch directory under `root`, creating `root` if needed.
    pub fn create(root: &Path) -> Result<Self, StockscanError> {
        std::fs::create_dir_all(root).map_err(|e| StockscanError::IoFailure {
            path: root.to_path_buf(),
            detail: format!("cannot create scratch root: {e}"),
        })?;

        let dir = tempfile::Builder::new()
            .prefix("scan-")
            .tempdir_in(root)
            .map_err(|e| StockscanError::IoFailure {
                path: root.to_path_buf(),
                detail: format!("cannot create scratch directory: {e}"),
            })?;

        let original = dir.path().join(ORIGINAL_NAME);
        let preprocessed = dir.path().join(PREPROCESSED_NAME);
        debug!("Scratch space created at {}", dir.path().display());

        Ok(Self {
            original,
            preprocessed,
            dir: Some(dir),
        })
    }

    /// Path the raw upload is written to.
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// Path the preprocessed PNG is written to.
    pub fn preprocessed(&self) -> &Path {
        &self.preprocessed
    }

    /// The scratch directory itself.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    /// Persist the uploaded bytes as the original image.
    pub async fn write_upload(&self, bytes: &[u8]) -> Result<(), StockscanError> {
        tokio::fs::write(&self.original, bytes)
            .await
            .map_err(|e| StockscanError::IoFailure {
                path: self.original.clone(),
                detail: format!("cannot store upload: {e}"),
            })
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!("Scratch space removed: {}", path.display()),
            Err(e) => warn!("Failed to remove scratch space {}: {}", path.display(), e),
        }
    }
}
