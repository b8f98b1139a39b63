/*!
 * Host Termination Notifications
 *
 * The host owns a single termination source. Each worker invocation
 * subscribes to it while outstanding and unsubscribes by dropping the
 * returned listener; OS signal handlers are never installed per invocation.
 */

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use tokio::sync::broadcast;
use tracing::debug;

/// Host-level termination signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostSignal::Interrupt => write!(f, "SIGINT"),
            HostSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Pending notification for one invocation; dropping it deregisters
pub type TerminationListener = BoxFuture<'static, HostSignal>;

/// Source of host termination notifications
pub trait TerminationSource: Send + Sync {
    /// Register for the next termination signal
    fn listen(&self) -> io::Result<TerminationListener>;
}

/// Termination notifications from the operating system
///
/// Installed once by the host, which owns it for the rest of its life. The
/// OS handlers stay registered after `install`; per-invocation listeners only
/// subscribe to the relay, so no invocation touches signal dispositions.
#[derive(Debug, Clone)]
pub struct HostTermination {
    relay: ManualTermination,
}

impl HostTermination {
    /// Register for SIGINT and SIGTERM and relay them to listeners
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let relay = ManualTermination::new();
        let sender = relay.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = interrupt.recv() => HostSignal::Interrupt,
                    Some(()) = terminate.recv() => HostSignal::Terminate,
                    else => break,
                };
                let delivered = sender.raise(received);
                debug!(signal = %received, delivered, "Host termination signal relayed");
            }
        });

        Ok(Self { relay })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        let relay = ManualTermination::new();
        let sender = relay.clone();

        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                sender.raise(HostSignal::Interrupt);
            }
        });

        Ok(Self { relay })
    }

    /// Number of listeners currently subscribed
    pub fn listener_count(&self) -> usize {
        self.relay.listener_count()
    }
}

impl TerminationSource for HostTermination {
    fn listen(&self) -> io::Result<TerminationListener> {
        self.relay.listen()
    }
}

/// Termination notifications raised by the host itself
///
/// Used when the embedding host owns signal handling, and in tests.
#[derive(Debug, Clone)]
pub struct ManualTermination {
    tx: broadcast::Sender<HostSignal>,
}

impl ManualTermination {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self { tx }
    }

    /// Notify every registered listener; returns how many were registered
    pub fn raise(&self, signal: HostSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    /// Number of invocations currently registered
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ManualTermination {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminationSource for ManualTermination {
    fn listen(&self) -> io::Result<TerminationListener> {
        let mut rx = self.tx.subscribe();
        Ok(Box::pin(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => return signal,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        return std::future::pending().await;
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_signal_display() {
        assert_eq!(HostSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(HostSignal::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn test_manual_termination_delivers() {
        let source = ManualTermination::new();
        let listener = source.listen().unwrap();
        assert_eq!(source.listener_count(), 1);

        assert_eq!(source.raise(HostSignal::Terminate), 1);
        assert_eq!(listener.await, HostSignal::Terminate);
    }

    #[tokio::test]
    async fn test_dropping_listener_deregisters() {
        let source = ManualTermination::new();
        let first = source.listen().unwrap();
        let second = source.listen().unwrap();
        assert_eq!(source.listener_count(), 2);

        drop(first);
        drop(second);
        assert_eq!(source.listener_count(), 0);
        assert_eq!(source.raise(HostSignal::Interrupt), 0);
    }

    #[tokio::test]
    async fn test_listener_pending_without_signal() {
        let source = ManualTermination::new();
        let listener = source.listen().unwrap();

        let waited = tokio::time::timeout(Duration::from_millis(20), listener).await;
        assert!(waited.is_err());
    }
}
