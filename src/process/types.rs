/*!
 * Process Types
 * Requests, results and bookkeeping records for interpreter workers
 */

use crate::core::types::OsPid;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// One blob of interpreter source to run
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub source: String,
    /// Falls back to the configured default when unset
    pub timeout: Option<Duration>,
    /// Extra environment passed to the worker
    pub env: Vec<(String, OsString)>,
}

impl ScriptRequest {
    #[inline]
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timeout: None,
            env: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a worker that finished successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerOutput {
    pub pid: OsPid,
    pub stdout: String,
    /// Diagnostic only; never decides success
    pub stderr: String,
    /// `None` when the platform reported no exit code
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

/// Registry entry for a worker that is still outstanding
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pid: OsPid,
    scratch: PathBuf,
    started_at: Instant,
    exited: watch::Receiver<bool>,
}

impl WorkerHandle {
    pub fn new(pid: OsPid, scratch: PathBuf, exited: watch::Receiver<bool>) -> Self {
        Self {
            pid,
            scratch,
            started_at: Instant::now(),
            exited,
        }
    }

    #[inline]
    pub fn pid(&self) -> OsPid {
        self.pid
    }

    #[inline]
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    #[inline]
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Resolve once the worker has exited (or its owner is gone)
    pub async fn wait_exited(mut self) {
        // Err means the executor dropped the sender: nothing left to wait for
        let _ = self.exited.wait_for(|exited| *exited).await;
    }
}

/// Progress of a worker's one-time cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupState {
    Pending,
    InFlight,
    Done,
}

impl CleanupState {
    pub(crate) const fn as_u8(self) -> u8 {
        match self {
            CleanupState::Pending => 0,
            CleanupState::InFlight => 1,
            CleanupState::Done => 2,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => CleanupState::Pending,
            1 => CleanupState::InFlight,
            _ => CleanupState::Done,
        }
    }
}

/// Side effects performed by a worker's cleanup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// The worker was still in the registry
    pub untracked: bool,
    /// The scratch file was still on disk
    pub scratch_removed: bool,
}

/// Outcome of `ProcessRegistry::kill_all`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Workers that exited within the grace period
    pub exited: usize,
    /// Workers dropped from tracking after the grace period ran out
    pub abandoned: usize,
}

impl ShutdownReport {
    pub fn total(&self) -> usize {
        self.exited + self.abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = ScriptRequest::new("1 + 1")
            .with_timeout(Duration::from_millis(250))
            .with_env("KEY", "value");

        assert_eq!(req.source, "1 + 1");
        assert_eq!(req.timeout, Some(Duration::from_millis(250)));
        assert_eq!(req.env, vec![("KEY".to_string(), OsString::from("value"))]);
    }

    #[test]
    fn test_cleanup_state_roundtrip() {
        for state in [CleanupState::Pending, CleanupState::InFlight, CleanupState::Done] {
            assert_eq!(CleanupState::from_u8(state.as_u8()), state);
        }
    }

    #[tokio::test]
    async fn test_handle_wait_exited() {
        let (tx, rx) = watch::channel(false);
        let handle = WorkerHandle::new(7, PathBuf::from("/tmp/x"), rx);

        let waiter = tokio::spawn(handle.wait_exited());
        tx.send_replace(true);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_wait_after_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        let handle = WorkerHandle::new(7, PathBuf::from("/tmp/x"), rx);

        drop(tx);
        handle.wait_exited().await;
    }
}
