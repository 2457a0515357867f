/*!
 * Resource Monitor
 *
 * One pass of the resource sampler loop: sample every running process off
 * the async threads, store the readings, enforce the memory limit and
 * refresh the aggregate stats.
 */

use super::periodic::PeriodicTask;
use super::registry::{KillReason, ProcessSignal};
use super::resources::{sample_or_estimate, ResourceUsage};
use super::state::ManagerState;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, warn};

pub(crate) fn spawn(state: Arc<ManagerState>) -> PeriodicTask {
    let period = state.limits.read().resource_check_interval();
    PeriodicTask::spawn("resource-monitor", period, move || {
        let state = state.clone();
        async move { sample_once(&state).await }
    })
}

pub(crate) async fn sample_once(state: &Arc<ManagerState>) {
    let targets = state.registry.lock().sample_targets(Instant::now());
    if targets.is_empty() {
        state.registry.lock().recompute_aggregates();
        return;
    }

    let sampler = state.sampler.clone();
    let fallback = state.fallback;
    let sampled = tokio::task::spawn_blocking(move || {
        targets
            .into_iter()
            .map(|t| {
                let usage = sample_or_estimate(sampler.as_ref(), &fallback, t.pid, t.age);
                (t.id, usage)
            })
            .collect::<Vec<_>>()
    })
    .await;

    let samples = match sampled {
        Ok(samples) => samples,
        Err(e) => {
            error!(error = %e, "Sampling task failed");
            return;
        }
    };

    let mut registry = state.registry.lock();
    for (id, usage) in samples {
        let Some(record) = registry.get_mut(&id) else {
            continue;
        };
        if !record.is_running() {
            continue;
        }
        let ResourceUsage {
            memory_mb,
            cpu_percent,
            estimated,
        } = usage;
        record.memory_usage_mb = memory_mb;
        record.cpu_usage_percent = cpu_percent;

        if let Some(cpu) = cpu_percent.filter(|cpu| *cpu > record.max_cpu_percent) {
            warn!(
                id = %id,
                pid = record.pid,
                cpu_percent = cpu,
                limit = record.max_cpu_percent,
                "Process over CPU limit"
            );
        }

        // Estimates never justify a kill
        if !estimated && memory_mb > record.max_memory_mb as f64 {
            warn!(
                id = %id,
                pid = record.pid,
                memory_mb,
                limit_mb = record.max_memory_mb,
                "Process over memory limit, killing"
            );
            if let Err(e) = registry.signal(&id, ProcessSignal::Kill, KillReason::ResourceLimit) {
                warn!(id = %id, error = %e, "Memory limit kill failed");
            }
        }
    }
    registry.recompute_aggregates();
}
