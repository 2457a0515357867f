/*!
 * Cleanup Sweeper
 * Evicts terminal records once their retention window has passed
 */

use super::periodic::PeriodicTask;
use super::state::ManagerState;
use super::types::LifecycleEvent;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

pub(crate) fn spawn(state: Arc<ManagerState>) -> PeriodicTask {
    let period = state.limits.read().cleanup_interval();
    PeriodicTask::spawn("cleanup-sweeper", period, move || {
        let state = state.clone();
        async move {
            sweep(&state);
        }
    })
}

/// Returns how many records were evicted. Running records are never touched.
pub(crate) fn sweep(state: &ManagerState) -> usize {
    let evicted = state
        .registry
        .lock()
        .evict_expired(Instant::now(), state.retention);

    if !evicted.is_empty() {
        info!(count = evicted.len(), "Evicted expired process records");
    }
    let count = evicted.len();
    for id in evicted {
        state.emit(LifecycleEvent::ProcessCleanedUp { id });
    }
    count
}
