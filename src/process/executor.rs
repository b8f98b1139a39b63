/*!
 * Script Executor
 *
 * Runs one blob of interpreter source to completion in an ephemeral worker:
 * scratch file, new process group, bounded wall-clock time, captured output,
 * exactly-once cleanup before the result is returned.
 */

use super::cleanup::WorkerCleanup;
use super::registry::ProcessRegistry;
use super::scratch::ScratchFile;
use super::signaler::{terminate, ProcessSignaler};
use super::termination::{HostSignal, TerminationListener, TerminationSource};
use super::types::{ScriptRequest, WorkerHandle, WorkerOutput};
use crate::config::BrokerConfig;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::REAP_TIMEOUT;
use crate::core::types::OsPid;
use crate::monitoring::worker_span;
use parking_lot::Mutex;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// First event observed for an outstanding worker
enum Trigger {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Signalled(HostSignal),
}

/// Executes interpreter source in isolated, short-lived workers
///
/// Cheap to clone; clones share configuration and registry. Any number of
/// executions may be outstanding at once.
#[derive(Clone)]
pub struct ScriptExecutor {
    config: Arc<BrokerConfig>,
    registry: ProcessRegistry,
    signaler: Arc<dyn ProcessSignaler>,
    termination: Arc<dyn TerminationSource>,
}

impl ScriptExecutor {
    /// Executor whose workers are interrupted by `termination`
    ///
    /// The host owns `termination` (usually one installed `HostTermination`)
    /// and shares it between executors.
    pub fn new(
        config: BrokerConfig,
        registry: ProcessRegistry,
        termination: Arc<dyn TerminationSource>,
    ) -> Self {
        let signaler = registry.signaler();
        Self {
            config: Arc::new(config),
            registry,
            signaler,
            termination,
        }
    }

    #[inline]
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Run `source` and return its captured standard output
    ///
    /// `timeout` falls back to the configured default.
    pub async fn execute(&self, source: &str, timeout: Option<Duration>) -> ProcessResult<String> {
        let mut request = ScriptRequest::new(source);
        request.timeout = timeout;
        self.run(request).await.map(|output| output.stdout)
    }

    /// Run a request and return everything captured from the worker
    pub async fn run(&self, request: ScriptRequest) -> ProcessResult<WorkerOutput> {
        if request.source.trim().is_empty() {
            return Err(ProcessError::EmptySource);
        }
        let timeout = request.timeout.unwrap_or(self.config.default_timeout);

        let scratch = ScratchFile::create(
            &self.config.scratch_dir,
            &self.config.scratch_extension,
            &request.source,
        )
        .await?;

        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(&self.config.interpreter_args)
            .arg(scratch.path())
            .envs(request.env.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        self.signaler.start_group(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                scratch.remove().await;
                return Err(self.spawn_error(e));
            }
        };

        let Some(pid) = child.id() else {
            scratch.remove().await;
            let _ = child.start_kill();
            return Err(ProcessError::SpawnFailed(
                "worker was not assigned a process id".to_string(),
            ));
        };

        self.supervise(child, pid, scratch, timeout)
            .instrument(worker_span(pid, timeout))
            .await
    }

    fn spawn_error(&self, e: io::Error) -> ProcessError {
        if e.kind() == io::ErrorKind::NotFound {
            warn!(program = %self.config.interpreter, "Interpreter not found");
            ProcessError::ExecutableNotFound {
                program: self.config.interpreter.clone(),
            }
        } else {
            warn!(program = %self.config.interpreter, error = %e, "Worker spawn failed");
            ProcessError::SpawnFailed(format!("{}: {}", self.config.interpreter, e))
        }
    }

    async fn supervise(
        &self,
        mut child: Child,
        pid: OsPid,
        scratch: ScratchFile,
        timeout: Duration,
    ) -> ProcessResult<WorkerOutput> {
        let started = Instant::now();
        let (exited_tx, exited_rx) = watch::channel(false);

        self.registry
            .track(WorkerHandle::new(pid, scratch.path().to_path_buf(), exited_rx));
        let cleanup = WorkerCleanup::new(pid, scratch, self.registry.clone());
        let mut termination = self.listen_for_termination();
        info!("Worker spawned");

        let stdout = child.stdout.take().map(StreamCapture::spawn);
        let stderr = child.stderr.take().map(StreamCapture::spawn);

        let mut timer = Box::pin(tokio::time::sleep(timeout));
        let trigger = tokio::select! {
            status = child.wait() => Trigger::Exited(status),
            () = &mut timer => Trigger::TimedOut,
            signal = &mut termination => Trigger::Signalled(signal),
        };
        // Cancel the timer and unsubscribe from host termination
        drop(timer);
        drop(termination);

        let result = match trigger {
            Trigger::Exited(Ok(status)) => {
                exited_tx.send_replace(true);
                self.sweep_group(pid);
                let (stdout, stderr) = tokio::join!(drain(stdout), drain(stderr));
                match status.code() {
                    Some(0) | None => {
                        info!(code = ?status.code(), "Worker exited");
                        Ok(WorkerOutput {
                            pid,
                            stdout,
                            stderr,
                            exit_code: status.code(),
                            elapsed: started.elapsed(),
                        })
                    }
                    Some(code) => {
                        warn!(code, "Worker exited with failure");
                        Err(ProcessError::NonZeroExit { code, stderr })
                    }
                }
            }
            Trigger::Exited(Err(e)) => {
                warn!(error = %e, "Worker wait failed");
                self.force_terminate(&mut child, pid).await;
                exited_tx.send_replace(true);
                Err(ProcessError::SpawnFailed(format!("worker {}: {}", pid, e)))
            }
            Trigger::TimedOut => {
                warn!("Worker timed out, terminating process group");
                self.force_terminate(&mut child, pid).await;
                exited_tx.send_replace(true);
                Err(ProcessError::Timeout { timeout })
            }
            Trigger::Signalled(signal) => {
                warn!(%signal, "Host termination signal, terminating worker");
                self.force_terminate(&mut child, pid).await;
                exited_tx.send_replace(true);
                Err(ProcessError::Interrupted {
                    signal: signal.to_string(),
                })
            }
        };

        cleanup.run().await;
        result
    }

    /// Kill descendants left in the group after the leader exited
    ///
    /// Only the group is signalled: the leader's pid is already reaped and
    /// may be reused, so there is no direct-kill fallback here.
    fn sweep_group(&self, pid: OsPid) {
        match self.signaler.kill_group(pid) {
            Ok(()) => debug!("Killed descendants remaining in worker group"),
            Err(e) => debug!(error = %e, "No descendants remaining in worker group"),
        }
    }

    fn listen_for_termination(&self) -> TerminationListener {
        match self.termination.listen() {
            Ok(listener) => listener,
            Err(e) => {
                warn!(error = %e, "Could not register for host termination signals");
                Box::pin(std::future::pending())
            }
        }
    }

    /// Kill the worker's process group, or the worker alone, then reap it
    async fn force_terminate(&self, child: &mut Child, pid: OsPid) {
        if !terminate(self.signaler.as_ref(), pid) {
            debug!("Signaler could not deliver a kill, killing child handle");
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "Direct kill failed");
            }
        }

        match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => debug!(?status, "Worker reaped"),
            Ok(Err(e)) => warn!(error = %e, "Failed to reap worker"),
            Err(_) => warn!("Worker still running after kill"),
        }
    }
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("interpreter", &self.config.interpreter)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Worker output stream read into a buffer that outlives the reader task
///
/// Bytes read before the task is aborted are kept. Dropping the capture
/// aborts the reader.
struct StreamCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl StreamCapture {
    fn spawn<R>(mut stream: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let reader = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink.lock().extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!(error = %e, "Worker output stream closed with error");
                        break;
                    }
                }
            }
        });
        Self { buf, reader }
    }

    fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buf.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Drop for StreamCapture {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Wait for a stream to close; a holder outside the group cannot stall us
async fn drain(capture: Option<StreamCapture>) -> String {
    let Some(mut capture) = capture else {
        return String::new();
    };
    match tokio::time::timeout(REAP_TIMEOUT, &mut capture.reader).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Output reader task failed"),
        Err(_) => warn!("Output stream still open after worker exit, keeping what was read"),
    }
    capture.take()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::signaler::GroupSignaler;
    use crate::process::termination::ManualTermination;

    fn executor(dir: &std::path::Path) -> ScriptExecutor {
        let config = BrokerConfig::new()
            .with_interpreter("/bin/sh")
            .with_scratch_dir(dir)
            .with_scratch_extension("sh");
        let registry = ProcessRegistry::new(Arc::new(GroupSignaler::new()));
        ScriptExecutor::new(config, registry, Arc::new(ManualTermination::new()))
    }

    #[tokio::test]
    async fn test_empty_source_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());

        assert_eq!(exec.execute("  \n", None).await, Err(ProcessError::EmptySource));
    }

    #[tokio::test]
    async fn test_run_reports_pid_and_code() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());

        let output = exec.run(ScriptRequest::new("echo hi")).await.unwrap();

        assert!(output.pid > 0);
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, "hi\n");
        assert!(!exec.registry().is_tracked(output.pid));
    }

    #[tokio::test]
    async fn test_env_passed_to_worker() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());

        let output = exec
            .run(ScriptRequest::new("printf '%s' \"$GREETING\"").with_env("GREETING", "hello"))
            .await
            .unwrap();

        assert_eq!(output.stdout, "hello");
    }
}
