/*!
 * Manager State
 * Everything the public manager, the supervisors and the background loops share
 */

use super::config::ProcessLimits;
use super::registry::{KillReason, ProcessSignal, Registry};
use super::resources::{HeuristicSampler, ResourceSampler};
use super::types::LifecycleEvent;
use crate::core::errors::ExecResult;
use crate::security::CommandValidator;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub(crate) struct ManagerState {
    pub(crate) registry: Mutex<Registry>,
    pub(crate) limits: RwLock<ProcessLimits>,
    pub(crate) sampler: Arc<dyn ResourceSampler>,
    pub(crate) fallback: HeuristicSampler,
    pub(crate) validator: Arc<dyn CommandValidator>,
    pub(crate) retention: Duration,
    /// Woken whenever a supervised process exits
    pub(crate) exited: Notify,
    shut_down: AtomicBool,
    observers: Mutex<Vec<mpsc::UnboundedSender<LifecycleEvent>>>,
}

impl ManagerState {
    pub(crate) fn new(
        limits: ProcessLimits,
        sampler: Arc<dyn ResourceSampler>,
        validator: Arc<dyn CommandValidator>,
        retention: Duration,
    ) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            limits: RwLock::new(limits),
            sampler,
            fallback: HeuristicSampler,
            validator,
            retention,
            exited: Notify::new(),
            shut_down: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<LifecycleEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.lock().push(tx);
        rx
    }

    /// Deliver to every live observer, dropping the closed ones
    pub(crate) fn emit(&self, event: LifecycleEvent) {
        self.observers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn force_kill(&self, id: &str, reason: KillReason) -> ExecResult<bool> {
        self.registry.lock().signal(id, ProcessSignal::Kill, reason)
    }

    pub(crate) fn terminate(&self, id: &str, reason: KillReason) -> ExecResult<bool> {
        let grace = self.limits.read().grace_period();
        self.registry
            .lock()
            .signal(id, ProcessSignal::Terminate { grace }, reason)
    }

    /// Forcefully kill every running record; returns how many were signalled
    pub(crate) fn kill_running(&self, reason: KillReason) -> usize {
        let mut registry = self.registry.lock();
        let mut killed = 0;
        for id in registry.running_ids() {
            match registry.signal(&id, ProcessSignal::Kill, reason) {
                Ok(true) => killed += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(id = %id, error = %e, "Kill request failed"),
            }
        }
        killed
    }

    /// Flip to shut down; true only for the first caller
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shut_down.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}
