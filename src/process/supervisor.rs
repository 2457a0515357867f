/*!
 * Process Supervisor
 *
 * One task per launched process. It exclusively owns the OS child handle,
 * applies kill requests and the deadline, reports the exit to the registry
 * and the waiting caller, then evicts the record after retention.
 */

use super::escalation::{Escalation, EscalationAction};
use super::registry::{derive_status, ExitOutcome, KillReason, ProcessSignal};
use super::state::ManagerState;
use super::types::{CommandResult, LifecycleEvent, ProcessStatus};
use crate::core::errors::{ExecError, ExecResult};
use crate::core::limits::{
    MAX_CAPTURED_OUTPUT_BYTES, OUTPUT_DRAIN_TIMEOUT, VISIBLE_TERMINAL_PLACEHOLDER,
};
use crate::core::types::{OsPid, ProcessId};
use parking_lot::Mutex;
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything a supervisor needs besides the child and its control channel
pub(crate) struct Supervision {
    pub id: ProcessId,
    pub pid: Option<OsPid>,
    pub started: Instant,
    pub deadline: Instant,
    pub state: Arc<ManagerState>,
    pub reply: oneshot::Sender<ExecResult<CommandResult>>,
}

pub(crate) async fn supervise(
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<ProcessSignal>,
    sup: Supervision,
) {
    let Supervision {
        id,
        pid,
        started,
        deadline,
        state,
        reply,
    } = sup;

    let capture = child.stdout.is_some();
    let stdout = child.stdout.take().map(CapturedStream::spawn);
    let stderr = child.stderr.take().map(CapturedStream::spawn);

    let mut escalation = Escalation::armed(deadline);
    let mut control_open = true;

    let exit = loop {
        let wakeup = escalation.wakeup();
        tokio::select! {
            status = child.wait() => break status,

            signal = control.recv(), if control_open => match signal {
                Some(ProcessSignal::Terminate { grace }) => {
                    if escalation.begin_grace(Instant::now(), grace) {
                        debug!(id = %id, ?grace, "Graceful termination requested");
                        if !terminate_gracefully(pid) {
                            kill_forcefully(&mut child, pid).await;
                            escalation.disarm();
                        }
                    }
                }
                Some(ProcessSignal::Kill) => {
                    debug!(id = %id, "Forceful termination requested");
                    kill_forcefully(&mut child, pid).await;
                    escalation.disarm();
                }
                None => {
                    // Record dropped while still running: the registry was cleared
                    control_open = false;
                    kill_forcefully(&mut child, pid).await;
                    escalation.disarm();
                }
            },

            _ = sleep_until(wakeup) => match escalation.fire(Instant::now()) {
                Some(EscalationAction::DeadlineExpired) => {
                    warn!(id = %id, "Deadline reached, killing process");
                    state.registry.lock().mark_timed_out(&id);
                    kill_forcefully(&mut child, pid).await;
                }
                Some(EscalationAction::GraceExpired) => {
                    warn!(id = %id, "Grace period elapsed, killing process");
                    kill_forcefully(&mut child, pid).await;
                }
                None => {}
            },
        }
    };

    let outcome = match exit {
        Ok(status) => exit_outcome(&status),
        Err(e) => {
            error!(id = %id, error = %e, "Waiting on process failed");
            ExitOutcome::default()
        }
    };

    let finalized = state.registry.lock().finalize(&id, outcome.clone());
    if let Some(pid) = pid {
        state.sampler.forget(pid);
    }

    let drain_deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
    let (stdout, stdout_truncated) = drain(stdout, drain_deadline).await;
    let (stderr, stderr_truncated) = drain(stderr, drain_deadline).await;

    let (status, execution_time) = match finalized {
        Some(finalized) => (finalized.status, finalized.execution_time),
        // Cleared by shutdown before the exit arrived
        None => (
            derive_status(Some(KillReason::Shutdown), &outcome),
            started.elapsed(),
        ),
    };

    info!(
        id = %id,
        pid,
        status = %status,
        exit_code = outcome.exit_code,
        signal = outcome.signal.as_deref(),
        elapsed_ms = execution_time.as_millis() as u64,
        "Process exited"
    );
    state.emit(LifecycleEvent::ProcessExited {
        id: id.clone(),
        status,
    });
    state.exited.notify_waiters();

    let result = if status == ProcessStatus::Completed {
        Ok(CommandResult {
            stdout: if capture {
                stdout
            } else {
                VISIBLE_TERMINAL_PLACEHOLDER.to_string()
            },
            stderr,
            exit_code: outcome.exit_code,
            signal: outcome.signal,
            execution_time_ms: execution_time.as_millis() as u64,
            truncated: stdout_truncated || stderr_truncated,
        })
    } else {
        Err(ExecError::ProcessTerminated {
            status,
            exit_code: outcome.exit_code,
            signal: outcome.signal,
            stderr,
        })
    };
    // The caller may have given up waiting
    let _ = reply.send(result);

    if finalized.is_none() {
        return;
    }

    tokio::time::sleep(state.retention).await;
    let evicted = state
        .registry
        .lock()
        .evict_if_expired(&id, Instant::now(), state.retention);
    if evicted {
        debug!(id = %id, "Process record evicted");
        state.emit(LifecycleEvent::ProcessCleanedUp { id });
    }
}

async fn sleep_until(wakeup: Option<Instant>) {
    match wakeup {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Send the platform's graceful request. False when there is none.
fn terminate_gracefully(pid: Option<OsPid>) -> bool {
    #[cfg(unix)]
    {
        match pid {
            Some(pid) => signal_group(pid, nix::sys::signal::Signal::SIGTERM),
            None => false,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

async fn kill_forcefully(child: &mut Child, pid: Option<OsPid>) {
    #[cfg(unix)]
    {
        if let Some(pid) = pid {
            if signal_group(pid, nix::sys::signal::Signal::SIGKILL) {
                return;
            }
        }
    }

    #[cfg(windows)]
    {
        if let Some(pid) = pid {
            if taskkill_tree(pid).await {
                return;
            }
        }
    }

    if let Err(e) = child.start_kill() {
        warn!(pid, error = %e, "Failed to kill process");
    }
}

/// Signal the whole process group led by `pid`
#[cfg(unix)]
fn signal_group(pid: OsPid, signal: nix::sys::signal::Signal) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => true,
        Err(e) => {
            debug!(pid, ?signal, error = %e, "Group signal failed");
            false
        }
    }
}

#[cfg(windows)]
async fn taskkill_tree(pid: OsPid) -> bool {
    let status = tokio::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;
    matches!(status, Ok(s) if s.success())
}

fn exit_outcome(status: &ExitStatus) -> ExitOutcome {
    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal().map(signal_name)
    };
    #[cfg(not(unix))]
    let signal = None;

    ExitOutcome {
        exit_code: status.code(),
        signal,
    }
}

#[cfg(unix)]
fn signal_name(raw: i32) -> String {
    nix::sys::signal::Signal::try_from(raw)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("SIG{}", raw))
}

#[derive(Debug, Default)]
struct CapturedOutput {
    bytes: Vec<u8>,
    truncated: bool,
}

impl CapturedOutput {
    fn push(&mut self, chunk: &[u8]) {
        let room = MAX_CAPTURED_OUTPUT_BYTES.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }
}

/// Reader task filling a bounded buffer
struct CapturedStream {
    buffer: Arc<Mutex<CapturedOutput>>,
    task: JoinHandle<()>,
}

impl CapturedStream {
    fn spawn<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(CapturedOutput::default()));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink.lock().push(&chunk[..n]),
                }
            }
        });
        Self { buffer, task }
    }
}

/// Wait for EOF until `deadline`, then take whatever was read
async fn drain(stream: Option<CapturedStream>, deadline: Instant) -> (String, bool) {
    let Some(mut stream) = stream else {
        return (String::new(), false);
    };
    if tokio::time::timeout_at(deadline, &mut stream.task).await.is_err() {
        debug!("Output still open after exit, abandoning the pipe");
        stream.task.abort();
    }

    let output = std::mem::take(&mut *stream.buffer.lock());
    (
        String::from_utf8_lossy(&output.bytes).into_owned(),
        output.truncated,
    )
}
