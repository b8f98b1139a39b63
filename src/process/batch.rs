/*!
 * Batch Execution
 *
 * Runs several source blobs under one shared timeout and reports each item
 * on its own. Every item writes an output artifact to the path it receives
 * in `BROKER_ARTIFACT_PATH`; the artifact is read back once the item's
 * worker has finished.
 */

use super::executor::ScriptExecutor;
use super::types::ScriptRequest;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::{ARTIFACT_PATH_ENV, SCRATCH_PREFIX};
use futures::future::join_all;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// One named source blob in a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub name: String,
    pub source: String,
}

impl BatchItem {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Why a single batch item failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchItemError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Worker exited cleanly but wrote no artifact at {path}")]
    MissingArtifact { path: PathBuf },

    #[error("Failed to read artifact {path}: {reason}")]
    ArtifactUnreadable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded { output: String, artifact: Vec<u8> },
    Failed { error: BatchItemError },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BatchOutcome::Succeeded { .. })
    }
}

/// Per-item result, in submission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub name: String,
    pub outcome: BatchOutcome,
}

/// Batch runner on top of a `ScriptExecutor`
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    executor: ScriptExecutor,
    timeout: Duration,
}

impl BatchExecutor {
    pub fn new(executor: ScriptExecutor) -> Self {
        let timeout = executor.config().batch_timeout;
        Self { executor, timeout }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run all items concurrently and report each one
    ///
    /// Fails as a whole only when the artifact directory cannot be created.
    pub async fn run(&self, items: Vec<BatchItem>) -> ProcessResult<Vec<BatchResult>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let dir = self.executor.config().scratch_dir.join(format!(
            "{}-batch-{}",
            SCRATCH_PREFIX,
            Uuid::new_v4().simple()
        ));
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| ProcessError::ScratchFile(format!("{}: {}", dir.display(), e)))?;

        info!(items = items.len(), timeout_ms = self.timeout.as_millis() as u64, "Running batch");

        let runs = items.into_iter().enumerate().map(|(index, item)| {
            // Index-based names keep item names out of the filesystem
            let artifact = dir.join(format!("item-{}.out", index));
            self.run_item(item, artifact)
        });
        let results = join_all(runs).await;

        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(dir = %dir.display(), error = %e, "Failed to remove batch artifact directory");
        }

        let failed = results.iter().filter(|r| !r.outcome.is_success()).count();
        info!(succeeded = results.len() - failed, failed, "Batch finished");
        Ok(results)
    }

    async fn run_item(&self, item: BatchItem, artifact: PathBuf) -> BatchResult {
        let request = ScriptRequest::new(item.source)
            .with_timeout(self.timeout)
            .with_env(ARTIFACT_PATH_ENV, artifact.clone());

        let outcome = match self.executor.run(request).await {
            Ok(output) => match read_artifact(&artifact).await {
                Ok(bytes) => BatchOutcome::Succeeded {
                    output: output.stdout,
                    artifact: bytes,
                },
                Err(error) => BatchOutcome::Failed { error },
            },
            Err(e) => BatchOutcome::Failed { error: e.into() },
        };

        if let BatchOutcome::Failed { error } = &outcome {
            warn!(item = %item.name, %error, "Batch item failed");
        }

        BatchResult {
            name: item.name,
            outcome,
        }
    }
}

async fn read_artifact(path: &Path) -> Result<Vec<u8>, BatchItemError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BatchItemError::MissingArtifact {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(BatchItemError::ArtifactUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}
