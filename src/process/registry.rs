/*!
 * Process Registry
 *
 * Bookkeeping of every interpreter worker currently in flight, so the host
 * can terminate all of them at shutdown without leaking orphans.
 *
 * A worker is present exactly while its cleanup has not completed: the
 * executor inserts it right after spawn and removes it during cleanup.
 */

use super::signaler::{terminate, ProcessSignaler};
use super::types::{ShutdownReport, WorkerHandle};
use crate::core::limits::DEFAULT_KILL_GRACE;
use crate::core::types::OsPid;
use ahash::RandomState;
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

struct RegistryInner {
    workers: DashMap<OsPid, WorkerHandle, RandomState>,
    signaler: Arc<dyn ProcessSignaler>,
    grace: Duration,
}

/// Shared registry of live workers
///
/// Cheap to clone; all clones see the same set.
#[derive(Clone)]
pub struct ProcessRegistry {
    inner: Arc<RegistryInner>,
}

impl ProcessRegistry {
    pub fn new(signaler: Arc<dyn ProcessSignaler>) -> Self {
        Self::with_grace(signaler, DEFAULT_KILL_GRACE)
    }

    pub fn with_grace(signaler: Arc<dyn ProcessSignaler>, grace: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                workers: DashMap::with_hasher(RandomState::new()),
                signaler,
                grace,
            }),
        }
    }

    /// Signaler used for every worker this registry tracks
    pub fn signaler(&self) -> Arc<dyn ProcessSignaler> {
        Arc::clone(&self.inner.signaler)
    }

    pub fn grace(&self) -> Duration {
        self.inner.grace
    }

    pub fn track(&self, worker: WorkerHandle) {
        let pid = worker.pid();
        if self.inner.workers.insert(pid, worker).is_some() {
            warn!(pid, "Replaced stale registry entry for reused pid");
        }
        debug!(pid, tracked = self.inner.workers.len(), "Worker tracked");
    }

    /// Remove a worker; returns whether it was tracked
    pub fn untrack(&self, pid: OsPid) -> bool {
        let removed = self.inner.workers.remove(&pid).is_some();
        if removed {
            debug!(pid, tracked = self.inner.workers.len(), "Worker untracked");
        }
        removed
    }

    #[inline]
    pub fn is_tracked(&self, pid: OsPid) -> bool {
        self.inner.workers.contains_key(&pid)
    }

    #[inline]
    pub fn tracked_count(&self) -> usize {
        self.inner.workers.len()
    }

    pub fn tracked_pids(&self) -> Vec<OsPid> {
        let mut pids: Vec<OsPid> = self.inner.workers.iter().map(|e| *e.key()).collect();
        pids.sort_unstable();
        pids
    }

    /// Terminate every tracked worker and forget them
    ///
    /// All workers are signalled up front and their grace periods run
    /// concurrently, so the wait is bounded by one grace period regardless of
    /// how many workers are tracked. Workers still alive afterwards are
    /// dropped from tracking anyway.
    pub async fn kill_all(&self) -> ShutdownReport {
        let workers: Vec<WorkerHandle> = self
            .inner
            .workers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        if workers.is_empty() {
            return ShutdownReport::default();
        }

        info!(count = workers.len(), "Terminating all tracked workers");

        let grace = self.inner.grace;
        let signaler = self.inner.signaler.as_ref();
        let pids: Vec<OsPid> = workers.iter().map(WorkerHandle::pid).collect();

        let outcomes = join_all(workers.into_iter().map(|worker| async move {
            let pid = worker.pid();
            terminate(signaler, pid);
            match tokio::time::timeout(grace, worker.wait_exited()).await {
                Ok(()) => true,
                Err(_) => {
                    warn!(pid, grace_ms = grace.as_millis() as u64, "Worker did not exit within grace period");
                    false
                }
            }
        }))
        .await;

        for pid in &pids {
            self.inner.workers.remove(pid);
        }

        let exited = outcomes.iter().filter(|&&ok| ok).count();
        let report = ShutdownReport {
            exited,
            abandoned: outcomes.len() - exited,
        };
        info!(
            exited = report.exited,
            abandoned = report.abandoned,
            "All tracked workers accounted for"
        );
        report
    }
}

impl std::fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("tracked", &self.inner.workers.len())
            .field("grace", &self.inner.grace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::signaler::MockProcessSignaler;
    use std::io;
    use std::path::PathBuf;
    use std::time::Instant;
    use tokio::sync::watch;

    fn handle(pid: OsPid) -> (WorkerHandle, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (WorkerHandle::new(pid, PathBuf::from(format!("/tmp/w{}", pid)), rx), tx)
    }

    #[test]
    fn test_track_untrack() {
        let registry = ProcessRegistry::new(Arc::new(MockProcessSignaler::new()));
        let (worker, _tx) = handle(10);

        registry.track(worker);
        assert!(registry.is_tracked(10));
        assert_eq!(registry.tracked_count(), 1);

        assert!(registry.untrack(10));
        assert!(!registry.untrack(10));
        assert_eq!(registry.tracked_count(), 0);
    }

    #[tokio::test]
    async fn test_kill_all_empty_has_no_side_effects() {
        let mut signaler = MockProcessSignaler::new();
        signaler.expect_kill_group().never();
        signaler.expect_kill_direct().never();
        let registry = ProcessRegistry::new(Arc::new(signaler));

        let report = registry.kill_all().await;

        assert_eq!(report, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_kill_all_falls_back_to_direct_kill() {
        let mut signaler = MockProcessSignaler::new();
        signaler
            .expect_kill_group()
            .times(1)
            .returning(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied)));
        signaler.expect_kill_direct().times(1).returning(|_| Ok(()));
        let registry = ProcessRegistry::new(Arc::new(signaler));

        let (worker, tx) = handle(11);
        registry.track(worker);
        drop(tx);

        let report = registry.kill_all().await;

        assert_eq!(report.exited, 1);
        assert_eq!(registry.tracked_count(), 0);
    }

    #[tokio::test]
    async fn test_kill_all_waits_for_exit_notification() {
        let mut signaler = MockProcessSignaler::new();
        signaler.expect_kill_group().times(2).returning(|_| Ok(()));
        let registry =
            ProcessRegistry::with_grace(Arc::new(signaler), Duration::from_secs(10));

        let (a, tx_a) = handle(21);
        let (b, tx_b) = handle(22);
        registry.track(a);
        registry.track(b);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx_a.send_replace(true);
            tx_b.send_replace(true);
        });

        let started = Instant::now();
        let report = registry.kill_all().await;

        assert_eq!(report.exited, 2);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(registry.tracked_count(), 0);
    }

    #[tokio::test]
    async fn test_grace_periods_overlap() {
        let mut signaler = MockProcessSignaler::new();
        signaler.expect_kill_group().times(3).returning(|_| Ok(()));
        let grace = Duration::from_millis(300);
        let registry = ProcessRegistry::with_grace(Arc::new(signaler), grace);

        let mut senders = Vec::new();
        for pid in 31..34 {
            let (worker, tx) = handle(pid);
            registry.track(worker);
            senders.push(tx);
        }

        let started = Instant::now();
        let report = registry.kill_all().await;
        let elapsed = started.elapsed();

        assert_eq!(report.abandoned, 3);
        assert!(elapsed >= grace);
        assert!(elapsed < grace * 2, "grace periods stacked: {:?}", elapsed);
        assert_eq!(registry.tracked_count(), 0);
        drop(senders);
    }

    #[tokio::test]
    async fn test_kill_all_twice_is_noop() {
        let mut signaler = MockProcessSignaler::new();
        signaler.expect_kill_group().times(1).returning(|_| Ok(()));
        let registry = ProcessRegistry::new(Arc::new(signaler));

        let (worker, tx) = handle(40);
        registry.track(worker);
        drop(tx);

        assert_eq!(registry.kill_all().await.total(), 1);
        assert_eq!(registry.kill_all().await.total(), 0);
    }
}
