/*!
 * Resource Limit Tests
 * Memory enforcement, CPU warnings and heuristic fallback in the sampler loop
 */

use super::common::{quiet_limits, sh, wait_until, BrokenSampler, FixedSampler};
use pretty_assertions::assert_eq;
use process_runner::process::ResourceUsage;
use process_runner::{LifecycleEvent, ProcessLimits, ProcessManager, ProcessStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn sampled_limits() -> ProcessLimits {
    ProcessLimits {
        resource_check_interval_ms: 100,
        ..quiet_limits()
    }
}

#[tokio::test]
async fn test_memory_over_limit_is_killed() {
    let pm = ProcessManager::builder()
        .with_limits(sampled_limits())
        .with_sampler(Arc::new(FixedSampler(ResourceUsage::measured(1024.0, 1.0))))
        .build();

    let started = Instant::now();
    let err = pm.execute(sh("sleep 5")).await.unwrap_err();

    assert_eq!(err.terminal_status(), Some(ProcessStatus::Killed));
    assert!(started.elapsed() < Duration::from_secs(2));

    let stats = pm.get_stats().processes;
    assert_eq!(stats.killed_processes, 1);
    assert_eq!(stats.active_processes, 0);
}

#[tokio::test]
async fn test_cpu_over_limit_only_warns() {
    let pm = ProcessManager::builder()
        .with_limits(sampled_limits())
        .with_sampler(Arc::new(FixedSampler(ResourceUsage::measured(1.0, 400.0))))
        .build();

    let result = pm.execute(sh("sleep 0.4")).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_estimates_never_trigger_kills() {
    let pm = ProcessManager::builder()
        .with_limits(ProcessLimits {
            max_process_memory_mb: 1,
            ..sampled_limits()
        })
        .with_sampler(Arc::new(BrokenSampler))
        .build();
    let mut events = pm.subscribe();

    let pm = Arc::new(pm);
    let run = tokio::spawn({
        let pm = pm.clone();
        async move { pm.execute(sh("sleep 0.5")).await }
    });
    let id = match events.recv().await.unwrap() {
        LifecycleEvent::ProcessStarted { id, .. } => id,
        other => panic!("unexpected event {:?}", other),
    };

    // The heuristic reading lands on the record, CPU stays unknown
    assert!(
        wait_until(Duration::from_secs(1), || {
            pm.get_process_info(&id)
                .is_some_and(|p| p.memory_usage_mb > 0.0 && p.cpu_usage_percent.is_none())
        })
        .await
    );

    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_aggregates_follow_running_processes() {
    let pm = Arc::new(
        ProcessManager::builder()
            .with_limits(sampled_limits())
            .with_sampler(Arc::new(FixedSampler(ResourceUsage::measured(8.0, 2.5))))
            .build(),
    );

    let runs: Vec<_> = (0..2)
        .map(|_| {
            let pm = pm.clone();
            tokio::spawn(async move { pm.execute(sh("sleep 5")).await })
        })
        .collect();

    assert!(
        wait_until(Duration::from_secs(2), || {
            let stats = pm.get_stats().processes;
            stats.active_processes == 2 && stats.total_memory_usage_mb == 16.0
        })
        .await
    );
    assert_eq!(pm.get_stats().processes.total_cpu_usage, 5.0);

    pm.kill_all_processes();
    for run in runs {
        assert!(run.await.unwrap().is_err());
    }

    assert!(
        wait_until(Duration::from_secs(1), || {
            pm.get_stats().processes.total_memory_usage_mb == 0.0
        })
        .await
    );
}
