/*!
 * Process Group Signaling
 *
 * Platform-specific worker termination behind a small interface so the
 * executor and registry stay platform independent and can be driven by a
 * fake in tests.
 */

use crate::core::types::OsPid;
use std::io;
use tokio::process::Command;
use tracing::debug;

#[cfg(unix)]
use nix::sys::signal::{kill, killpg, Signal as UnixSignal};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

/// Worker termination interface
#[cfg_attr(test, mockall::automock)]
pub trait ProcessSignaler: Send + Sync {
    /// Configure `cmd` so the spawned worker leads a new process group
    fn start_group(&self, cmd: &mut Command);

    /// Force-terminate the whole process group led by `pid`
    fn kill_group(&self, pid: OsPid) -> io::Result<()>;

    /// Force-terminate the single process `pid`
    fn kill_direct(&self, pid: OsPid) -> io::Result<()>;
}

/// Process group signaling through the OS
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupSignaler;

impl GroupSignaler {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn to_nix_pid(pid: OsPid) -> io::Result<NixPid> {
    i32::try_from(pid)
        .map(NixPid::from_raw)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("pid {} out of range", pid)))
}

impl ProcessSignaler for GroupSignaler {
    #[cfg(unix)]
    fn start_group(&self, cmd: &mut Command) {
        // pgid 0: the child's own pid becomes its group id
        cmd.process_group(0);
    }

    #[cfg(not(unix))]
    fn start_group(&self, _cmd: &mut Command) {}

    #[cfg(unix)]
    fn kill_group(&self, pid: OsPid) -> io::Result<()> {
        killpg(to_nix_pid(pid)?, UnixSignal::SIGKILL)?;
        debug!(pid, "Sent SIGKILL to process group");
        Ok(())
    }

    #[cfg(not(unix))]
    fn kill_group(&self, pid: OsPid) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("process groups not supported on this platform (pid {})", pid),
        ))
    }

    #[cfg(unix)]
    fn kill_direct(&self, pid: OsPid) -> io::Result<()> {
        kill(to_nix_pid(pid)?, UnixSignal::SIGKILL)?;
        debug!(pid, "Sent SIGKILL to process");
        Ok(())
    }

    #[cfg(not(unix))]
    fn kill_direct(&self, pid: OsPid) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("direct kill by pid not supported on this platform (pid {})", pid),
        ))
    }
}

/// Terminate `pid`'s group, falling back to the process alone
///
/// Returns `false` when neither signal could be delivered, which usually
/// means the worker is already gone.
pub fn terminate(signaler: &dyn ProcessSignaler, pid: OsPid) -> bool {
    match signaler.kill_group(pid) {
        Ok(()) => true,
        Err(group_err) => {
            debug!(pid, error = %group_err, "Group kill failed, killing process directly");
            match signaler.kill_direct(pid) {
                Ok(()) => true,
                Err(e) => {
                    debug!(pid, error = %e, "Direct kill failed");
                    false
                }
            }
        }
    }
}
