//! Bounded-concurrency process supervisor.
//!
//! Spawns child processes under an admission cap, accumulates their output,
//! and enforces a timeout with graceful-then-forceful termination. The cap
//! rejects over-capacity spawns outright; queueing is the request queue's
//! job, not the supervisor's.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::SupervisorConfig;
use crate::{OratorError, Result};

/// Per-run options.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub timeout: Duration,
    pub stdin: Option<String>,
}

impl RunOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            stdin: None,
        }
    }
}

pub struct ProcessSupervisor {
    slots: Arc<Semaphore>,
    max_processes: usize,
    kill_grace: Duration,
    debug_marker: String,
}

impl ProcessSupervisor {
    pub fn new(cfg: &SupervisorConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(cfg.max_processes)),
            max_processes: cfg.max_processes,
            kill_grace: Duration::from_millis(cfg.kill_grace_ms),
            debug_marker: cfg.debug_marker.clone(),
        }
    }

    /// Number of currently running child processes.
    pub fn running(&self) -> usize {
        self.max_processes - self.slots.available_permits()
    }

    /// Spawn `program` and resolve with its stdout text.
    ///
    /// Fails immediately with `AdmissionRejected` when the cap is reached.
    /// On timeout the child gets a graceful termination signal, then a
    /// forceful kill after the grace period. Nonzero exits surface the
    /// filtered stderr; the slot is released on every terminal path.
    pub async fn run(&self, program: &Path, args: &[String], opts: RunOptions) -> Result<String> {
        let _slot = self
            .slots
            .clone()
            .try_acquire_owned()
            .map_err(|_| OratorError::AdmissionRejected(self.max_processes))?;

        trace!(
            target: "supervisor",
            program = %program.display(),
            ?args,
            "spawn"
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if opts.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| OratorError::SpawnFailed(format!("{}: {e}", program.display())))?;

        if let Some(input) = opts.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).await?;
                // Dropping the handle closes the pipe.
            }
        }

        let stdout_task = drain_pipe(child.stdout.take());
        let stderr_task = drain_pipe(child.stderr.take());

        // Two-stage termination: a timer arms the token, the token triggers
        // SIGTERM, and the grace period escalates to SIGKILL.
        let deadline = CancellationToken::new();
        let timer = {
            let deadline = deadline.clone();
            let timeout = opts.timeout;
            tokio::spawn(async move {
                sleep(timeout).await;
                deadline.cancel();
            })
        };

        let status = tokio::select! {
            status = child.wait() => {
                timer.abort();
                status.map_err(|e| OratorError::SpawnFailed(format!("wait: {e}")))?
            }
            _ = deadline.cancelled() => {
                warn!(
                    target: "supervisor",
                    program = %program.display(),
                    timeout_ms = opts.timeout.as_millis() as u64,
                    "timeout; escalating termination"
                );
                terminate(&mut child, self.kill_grace).await;
                return Err(OratorError::ProcessTimeout(opts.timeout.as_millis() as u64));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if status.success() {
            debug!(target: "supervisor", program = %program.display(), "exit success");
            Ok(stdout)
        } else {
            // Exit code is unavailable when an unrelated signal killed the child.
            let code = status.code().unwrap_or(-1);
            let stderr = self.filter_stderr(&stderr);
            warn!(target: "supervisor", program = %program.display(), code, "exit non-zero");
            Err(OratorError::ProcessFailed { code, stderr })
        }
    }

    /// Drop stderr lines carrying the engine's non-fatal diagnostic marker
    /// before surfacing anything as an error.
    fn filter_stderr(&self, raw: &str) -> String {
        raw.lines()
            .filter(|line| !line.contains(&self.debug_marker))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

fn drain_pipe<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    })
}

/// Graceful-then-forceful termination: SIGTERM (unix), wait out the grace
/// period, then SIGKILL. Waits for the child so the slot only frees once
/// the process is gone.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {}
        Err(_) => {
            debug!(target: "supervisor", "grace period elapsed; force kill");
            let _ = child.kill().await;
        }
    }
}
