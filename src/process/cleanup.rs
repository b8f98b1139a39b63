/*!
 * Worker Cleanup
 *
 * Exactly-once teardown for one worker invocation. The first caller runs
 * the side effects; every later or concurrent caller awaits that same run
 * and receives its report.
 */

use super::registry::ProcessRegistry;
use super::scratch::ScratchFile;
use super::types::{CleanupReport, CleanupState};
use crate::core::types::OsPid;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Memoized cleanup for one worker
pub struct WorkerCleanup {
    pid: OsPid,
    scratch: ScratchFile,
    registry: ProcessRegistry,
    state: AtomicU8,
    runs: AtomicUsize,
    report: OnceCell<CleanupReport>,
}

impl WorkerCleanup {
    pub fn new(pid: OsPid, scratch: ScratchFile, registry: ProcessRegistry) -> Self {
        Self {
            pid,
            scratch,
            registry,
            state: AtomicU8::new(CleanupState::Pending.as_u8()),
            runs: AtomicUsize::new(0),
            report: OnceCell::new(),
        }
    }

    /// Run cleanup, or join the run already in progress
    pub async fn run(&self) -> CleanupReport {
        *self.report.get_or_init(|| self.perform()).await
    }

    async fn perform(&self) -> CleanupReport {
        self.state
            .store(CleanupState::InFlight.as_u8(), Ordering::Release);
        self.runs.fetch_add(1, Ordering::AcqRel);

        let untracked = self.registry.untrack(self.pid);
        let scratch_removed = self.scratch.remove().await;

        self.state.store(CleanupState::Done.as_u8(), Ordering::Release);
        debug!(pid = self.pid, untracked, scratch_removed, "Worker cleanup complete");

        CleanupReport {
            untracked,
            scratch_removed,
        }
    }

    #[inline]
    pub fn pid(&self) -> OsPid {
        self.pid
    }

    #[inline]
    pub fn state(&self) -> CleanupState {
        CleanupState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// How many times the side effects actually ran
    #[inline]
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }
}

impl Drop for WorkerCleanup {
    fn drop(&mut self) {
        // The owning future was dropped before cleanup finished
        if self.state() != CleanupState::Done {
            warn!(pid = self.pid, "Worker abandoned before cleanup, cleaning up synchronously");
            if let Err(e) = self.registry.signaler().kill_group(self.pid) {
                debug!(pid = self.pid, error = %e, "Group kill on abandon failed");
            }
            self.registry.untrack(self.pid);
            self.scratch.remove_blocking();
        }
    }
}

impl std::fmt::Debug for WorkerCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCleanup")
            .field("pid", &self.pid)
            .field("scratch", &self.scratch.path())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::signaler::{MockProcessSignaler, ProcessSignaler};
    use crate::process::types::WorkerHandle;
    use mockall::predicate::eq;
    use std::sync::Arc;
    use tokio::sync::watch;

    async fn setup_with(
        dir: &std::path::Path,
        signaler: Arc<dyn ProcessSignaler>,
    ) -> (WorkerCleanup, ProcessRegistry, std::path::PathBuf) {
        let registry = ProcessRegistry::new(signaler);
        let scratch = ScratchFile::create(dir, "sh", "true").await.unwrap();
        let path = scratch.path().to_path_buf();
        let (_tx, rx) = watch::channel(false);
        registry.track(WorkerHandle::new(4242, path.clone(), rx));
        (WorkerCleanup::new(4242, scratch, registry.clone()), registry, path)
    }

    async fn setup(dir: &std::path::Path) -> (WorkerCleanup, ProcessRegistry, std::path::PathBuf) {
        let mut signaler = MockProcessSignaler::new();
        signaler.expect_kill_group().never();
        setup_with(dir, Arc::new(signaler)).await
    }

    #[tokio::test]
    async fn test_cleanup_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (cleanup, registry, path) = setup(dir.path()).await;
        assert_eq!(cleanup.state(), CleanupState::Pending);

        let first = cleanup.run().await;
        let second = cleanup.run().await;

        assert_eq!(first, second);
        assert!(first.untracked);
        assert!(first.scratch_removed);
        assert_eq!(cleanup.runs(), 1);
        assert_eq!(cleanup.state(), CleanupState::Done);
        assert!(!registry.is_tracked(4242));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_before_run_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let mut signaler = MockProcessSignaler::new();
        signaler
            .expect_kill_group()
            .with(eq(4242))
            .times(1)
            .returning(|_| Ok(()));
        let (cleanup, registry, path) = setup_with(dir.path(), Arc::new(signaler)).await;

        drop(cleanup);

        assert!(!registry.is_tracked(4242));
        assert!(!path.exists());
    }
}
