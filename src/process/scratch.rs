/*!
 * Scratch Files
 * One uniquely named temporary source file per worker invocation
 */

use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::SCRATCH_PREFIX;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Temporary file holding one blob of interpreter source
///
/// Deletion is attempted at most once, by `remove` or else on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removal_attempted: AtomicBool,
}

impl ScratchFile {
    /// Build a collision-resistant path inside `dir`
    ///
    /// Combines a nanosecond timestamp with a random v4 UUID, so concurrent
    /// invocations never share a name.
    pub fn unique_path(dir: &Path, extension: &str) -> PathBuf {
        let stamp = OffsetDateTime::now_utc().unix_timestamp_nanos();
        let suffix = Uuid::new_v4().simple();
        dir.join(format!("{}-{}-{}.{}", SCRATCH_PREFIX, stamp, suffix, extension))
    }

    /// Write `contents` verbatim to a fresh file in `dir`
    pub async fn create(dir: &Path, extension: &str, contents: &str) -> ProcessResult<Self> {
        let path = Self::unique_path(dir, extension);

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| ProcessError::ScratchFile(format!("{}: {}", path.display(), e)))?;

        let scratch = Self {
            path,
            removal_attempted: AtomicBool::new(false),
        };
        let written = async {
            file.write_all(contents.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            scratch.remove().await;
            return Err(ProcessError::ScratchFile(format!(
                "{}: {}",
                scratch.path.display(),
                e
            )));
        }

        debug!(path = %scratch.path.display(), bytes = contents.len(), "Scratch file written");
        Ok(scratch)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file; an already missing file is not an error
    ///
    /// Returns whether this call removed it. Only the first call touches
    /// the filesystem.
    pub async fn remove(&self) -> bool {
        if self.removal_attempted.swap(true, Ordering::AcqRel) {
            return false;
        }
        Self::removal_outcome(&self.path, tokio::fs::remove_file(&self.path).await)
    }

    /// Blocking variant of `remove`
    pub fn remove_blocking(&self) -> bool {
        if self.removal_attempted.swap(true, Ordering::AcqRel) {
            return false;
        }
        Self::removal_outcome(&self.path, std::fs::remove_file(&self.path))
    }

    /// Whether a deletion has been attempted
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.removal_attempted.load(Ordering::Acquire)
    }

    fn removal_outcome(path: &Path, result: io::Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete scratch file");
                false
            }
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        // Owner went away between create and cleanup
        if self.remove_blocking() {
            debug!(path = %self.path.display(), "Scratch file removed on drop");
        }
    }
}
