/*!
 * Process Manager
 * Public entry point: admission, launch, kill, queries, limits and shutdown
 */

use super::cleanup;
use super::config::{LimitsUpdate, ProcessLimits};
use super::launcher;
use super::manager_builder::ProcessManagerBuilder;
use super::monitor_task;
use super::periodic::PeriodicTask;
use super::registry::{AdmissionTicket, KillReason, ProcessHandle, ProcessRecord};
use super::state::ManagerState;
use super::supervisor::{supervise, Supervision};
use super::types::{
    CommandResult, ExecuteRequest, KillMode, LifecycleEvent, ProcessInfo, ProcessStatus, Stats,
};
use crate::core::errors::{ExecError, ExecResult};
use crate::core::limits::SHUTDOWN_EXIT_WAIT;
use crate::core::types::generate_process_id;
use crate::monitoring::{command_span, HostSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{info, warn, Instrument};

struct BackgroundTasks {
    monitor: PeriodicTask,
    cleanup: PeriodicTask,
}

/// Runs OS commands under concurrency, memory, CPU and wall-clock limits.
///
/// Must be created inside a Tokio runtime: construction starts the resource
/// sampler and cleanup sweeper loops.
pub struct ProcessManager {
    state: Arc<ManagerState>,
    background: Mutex<Option<BackgroundTasks>>,
}

impl ProcessManager {
    /// Manager with the default validator, platform sampler and retention
    pub fn new(limits: ProcessLimits) -> Self {
        Self::builder().with_limits(limits).build()
    }

    pub fn builder() -> ProcessManagerBuilder {
        ProcessManagerBuilder::new()
    }

    pub(super) fn from_state(state: ManagerState) -> Self {
        let state = Arc::new(state);
        let background = BackgroundTasks {
            monitor: monitor_task::spawn(state.clone()),
            cleanup: cleanup::spawn(state.clone()),
        };

        {
            let limits = state.limits.read();
            info!(
                max_concurrent = limits.max_concurrent_processes,
                sampler = state.sampler.name(),
                "Process manager initialized"
            );
        }

        Self {
            state,
            background: Mutex::new(Some(background)),
        }
    }

    /// Run a command and wait for it to reach a terminal state.
    ///
    /// Resolves with the captured output on a zero exit; any other ending is
    /// a `ProcessTerminated` error.
    pub async fn execute(&self, request: ExecuteRequest) -> ExecResult<CommandResult> {
        let state = &self.state;
        if state.is_shut_down() {
            return Err(ExecError::ShutDown);
        }

        let ExecuteRequest {
            command,
            args,
            options,
        } = request;
        state.validator.validate_command(&command, &args)?;

        let limits = state.limits.read().clone();

        // Admission through registration happens without an await
        let ticket = AdmissionTicket::acquire(&state.registry, limits.max_concurrent_processes)?;
        let plan = launcher::build_plan(&command, &args, &options);
        let child = launcher::spawn(&plan, &options)?;

        let id = generate_process_id();
        let pid = child.id();
        let started = Instant::now();
        let deadline = started + limits.effective_timeout(options.timeout_ms);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = oneshot::channel();

        ticket.register(ProcessRecord::new(
            id.clone(),
            command.clone(),
            args.clone(),
            pid,
            &limits,
            deadline,
            ProcessHandle::new(control_tx),
        ));

        info!(id = %id, pid, command = %command, visible = options.visible_terminal, "Process started");
        state.emit(LifecycleEvent::ProcessStarted {
            id: id.clone(),
            command: command.clone(),
            args,
            pid,
        });

        let span = command_span(&id, &command, pid);
        tokio::spawn(
            supervise(
                child,
                control_rx,
                Supervision {
                    id: id.clone(),
                    pid,
                    started,
                    deadline,
                    state: state.clone(),
                    reply: reply_tx,
                },
            )
            .instrument(span),
        );

        // Lost a race with shutdown()
        if state.is_shut_down() {
            let _ = state.force_kill(&id, KillReason::Shutdown);
        }

        reply_rx.await.unwrap_or_else(|_| {
            Err(ExecError::ProcessTerminated {
                status: ProcessStatus::Killed,
                exit_code: None,
                signal: None,
                stderr: String::new(),
            })
        })
    }

    /// Ask a running process to stop. Graceful requests escalate to a
    /// forceful kill after the grace period. False for unknown or finished ids.
    pub fn kill_process(&self, id: &str, mode: KillMode) -> bool {
        let sent = match mode {
            KillMode::Graceful => self.state.terminate(id, KillReason::Requested),
            KillMode::Forceful => self.state.force_kill(id, KillReason::Requested),
        };
        match sent {
            Ok(sent) => sent,
            Err(e) => {
                warn!(id, error = %e, "Kill request failed");
                false
            }
        }
    }

    /// Forceful kill, skipping the grace period
    pub fn force_kill_process(&self, id: &str) -> ExecResult<bool> {
        self.state.force_kill(id, KillReason::Requested)
    }

    /// Force kill every running process; returns how many were signalled
    pub fn kill_all_processes(&self) -> usize {
        let killed = self.state.kill_running(KillReason::Requested);
        if killed > 0 {
            info!(count = killed, "Killed all running processes");
        }
        killed
    }

    /// Running and recently finished processes
    pub fn get_processes(&self) -> Vec<ProcessInfo> {
        self.state.registry.lock().infos()
    }

    pub fn get_process_info(&self, id: &str) -> Option<ProcessInfo> {
        self.state.registry.lock().get(id).map(|r| r.info())
    }

    pub fn get_stats(&self) -> Stats {
        let processes = self.state.registry.lock().stats();
        Stats {
            processes,
            host: HostSnapshot::capture(),
        }
    }

    /// Merge a partial update. Running processes keep the limits they started with.
    pub fn update_limits(&self, update: LimitsUpdate) {
        let (monitor_period, cleanup_period) = {
            let mut limits = self.state.limits.write();
            limits.merge(&update);
            info!(limits = ?*limits, "Process limits updated");
            (limits.resource_check_interval(), limits.cleanup_interval())
        };

        if let Some(tasks) = self.background.lock().as_ref() {
            if update.resource_check_interval_ms.is_some() {
                tasks.monitor.update_interval(monitor_period);
            }
            if update.cleanup_interval_ms.is_some() {
                tasks.cleanup.update_interval(cleanup_period);
            }
        }
    }

    pub fn get_limits(&self) -> ProcessLimits {
        self.state.limits.read().clone()
    }

    /// Observe process starts, exits and evictions
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        self.state.subscribe()
    }

    /// Kill everything, stop the background loops and clear the registry.
    /// Idempotent.
    pub async fn shutdown(&self) {
        if !self.state.begin_shutdown() {
            return;
        }

        let killed = self.state.kill_running(KillReason::Shutdown);
        info!(killed, "Shutting down process manager");

        self.wait_for_exits().await;

        let tasks = self.background.lock().take();
        if let Some(mut tasks) = tasks {
            tasks.monitor.shutdown().await;
            tasks.cleanup.shutdown().await;
        }

        // Dropping the remaining handles makes any straggler's supervisor kill it
        self.state.registry.lock().clear();
        info!("Process manager shut down");
    }

    async fn wait_for_exits(&self) {
        let give_up = Instant::now() + SHUTDOWN_EXIT_WAIT;
        loop {
            let notified = self.state.exited.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let running = self.state.registry.lock().running_count();
            if running == 0 {
                return;
            }
            if tokio::time::timeout_at(give_up, notified).await.is_err() {
                warn!(running, "Processes still running after shutdown wait");
                return;
            }
        }
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        if self.state.begin_shutdown() {
            self.state.kill_running(KillReason::Shutdown);
        }
    }
}
