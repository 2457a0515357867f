/*!
 * Process Lifecycle Tests
 * Admission, completion, timeout, kill escalation, retention and shutdown
 */

use super::common::{manager, quiet_limits, sh, sh_with, wait_until};
use pretty_assertions::assert_eq;
use process_runner::{
    ExecError, ExecuteOptions, KillMode, LifecycleEvent, LimitsUpdate, ProcessLimits,
    ProcessManager, ProcessStatus,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_captures_stdout_and_stderr() {
    let pm = manager(quiet_limits());

    let result = pm.execute(sh("echo out; echo err 1>&2")).await.unwrap();

    assert_eq!(result.stdout, "out\n");
    assert_eq!(result.stderr, "err\n");
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.signal, None);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_shell_operators_are_honored() {
    let pm = manager(quiet_limits());
    let request = process_runner::ExecuteRequest::new("echo")
        .with_args(["one", "&&", "echo", "two", "|", "tr", "a-z", "A-Z"]);

    let result = pm.execute(request).await.unwrap();
    assert_eq!(result.stdout, "one\nTWO\n");
}

#[tokio::test]
async fn test_nonzero_exit_is_failed() {
    let pm = manager(quiet_limits());

    let err = pm.execute(sh("echo oops 1>&2; exit 3")).await.unwrap_err();

    assert_eq!(
        err,
        ExecError::ProcessTerminated {
            status: ProcessStatus::Failed,
            exit_code: Some(3),
            signal: None,
            stderr: "oops\n".to_string(),
        }
    );
}

#[tokio::test]
async fn test_cwd_and_env_overrides() {
    let pm = manager(quiet_limits());
    let dir = tempfile::tempdir().unwrap();

    let options = ExecuteOptions::new()
        .with_cwd(dir.path())
        .with_env("RUNNER_TEST_VALUE", "hello");
    let result = pm
        .execute(sh_with("pwd -P; echo $RUNNER_TEST_VALUE", options))
        .await
        .unwrap();

    let expected = format!("{}\nhello\n", dir.path().canonicalize().unwrap().display());
    assert_eq!(result.stdout, expected);
}

#[tokio::test]
async fn test_concurrency_cap_rejects_extra_work() {
    let pm = manager(ProcessLimits {
        max_concurrent_processes: 2,
        ..quiet_limits()
    });

    let first = tokio::spawn({
        let pm = pm.clone();
        async move { pm.execute(sh("sleep 5")).await }
    });
    let second = tokio::spawn({
        let pm = pm.clone();
        async move { pm.execute(sh("sleep 5")).await }
    });
    assert!(wait_until(Duration::from_secs(2), || pm.get_processes().len() == 2).await);

    let third = pm.execute(sh("sleep 5")).await;
    assert_eq!(
        third,
        Err(ExecError::ResourceExhausted {
            active: 2,
            limit: 2
        })
    );
    assert_eq!(pm.get_processes().len(), 2);

    assert_eq!(pm.kill_all_processes(), 2);
    for handle in [first, second] {
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.terminal_status(), Some(ProcessStatus::Killed));
    }
}

#[tokio::test]
async fn test_spawn_failure_releases_slot() {
    let pm = manager(ProcessLimits {
        max_concurrent_processes: 1,
        ..quiet_limits()
    });

    let options = ExecuteOptions::new().with_cwd("/definitely/not/a/dir");
    let err = pm.execute(sh_with("true", options)).await.unwrap_err();
    assert!(matches!(err, ExecError::SpawnFailure { .. }));
    assert!(pm.get_processes().is_empty());

    assert!(pm.execute(sh("true")).await.is_ok());
}

#[tokio::test]
async fn test_deadline_times_out() {
    let pm = manager(quiet_limits());
    let options = ExecuteOptions::new().with_timeout_ms(1000);

    let started = Instant::now();
    let err = pm.execute(sh_with("sleep 5", options)).await.unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.terminal_status(), Some(ProcessStatus::Timeout));
    assert!(elapsed >= Duration::from_millis(950), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1300), "{:?}", elapsed);

    let stats = pm.get_stats().processes;
    assert_eq!(stats.timeout_processes, 1);
    assert_eq!(stats.active_processes, 0);
}

#[tokio::test]
async fn test_timeout_is_clamped_to_max() {
    let pm = manager(ProcessLimits {
        max_timeout_ms: 500,
        ..quiet_limits()
    });
    let options = ExecuteOptions::new().with_timeout_ms(60_000);

    let started = Instant::now();
    let err = pm.execute(sh_with("sleep 5", options)).await.unwrap_err();

    assert_eq!(err.terminal_status(), Some(ProcessStatus::Timeout));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_graceful_kill_of_cooperative_process() {
    let pm = manager(quiet_limits());
    let mut events = pm.subscribe();

    let run = tokio::spawn({
        let pm = pm.clone();
        async move { pm.execute(sh("sleep 5")).await }
    });
    let id = match events.recv().await.unwrap() {
        LifecycleEvent::ProcessStarted { id, .. } => id,
        other => panic!("unexpected event {:?}", other),
    };

    assert!(pm.kill_process(&id, KillMode::Graceful));
    let err = run.await.unwrap().unwrap_err();

    assert_eq!(err.terminal_status(), Some(ProcessStatus::Killed));
    match err {
        ExecError::ProcessTerminated { signal, .. } => {
            assert_eq!(signal.as_deref(), Some("SIGTERM"))
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_graceful_kill_escalates_after_grace() {
    let pm = manager(ProcessLimits {
        process_kill_grace_period_ms: 300,
        ..quiet_limits()
    });
    let mut events = pm.subscribe();

    let run = tokio::spawn({
        let pm = pm.clone();
        async move { pm.execute(sh("trap '' TERM; sleep 5")).await }
    });
    let id = match events.recv().await.unwrap() {
        LifecycleEvent::ProcessStarted { id, .. } => id,
        other => panic!("unexpected event {:?}", other),
    };
    // Let the shell install its trap
    tokio::time::sleep(Duration::from_millis(100)).await;

    let requested = Instant::now();
    assert!(pm.kill_process(&id, KillMode::Graceful));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        pm.get_process_info(&id).map(|p| p.status),
        Some(ProcessStatus::Running)
    );

    let err = run.await.unwrap().unwrap_err();
    let elapsed = requested.elapsed();
    assert_eq!(err.terminal_status(), Some(ProcessStatus::Killed));
    assert!(elapsed >= Duration::from_millis(250), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "{:?}", elapsed);
}

#[tokio::test]
async fn test_grace_period_never_outlasts_deadline() {
    let pm = manager(ProcessLimits {
        process_kill_grace_period_ms: 3000,
        ..quiet_limits()
    });
    let mut events = pm.subscribe();
    let options = ExecuteOptions::new().with_timeout_ms(1000);

    let started = Instant::now();
    let run = tokio::spawn({
        let pm = pm.clone();
        async move { pm.execute(sh_with("trap '' TERM; sleep 10", options)).await }
    });
    let id = match events.recv().await.unwrap() {
        LifecycleEvent::ProcessStarted { id, .. } => id,
        other => panic!("unexpected event {:?}", other),
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(pm.kill_process(&id, KillMode::Graceful));

    let err = run.await.unwrap().unwrap_err();
    let elapsed = started.elapsed();

    // The graceful request came first, so the record reads as killed
    assert_eq!(err.terminal_status(), Some(ProcessStatus::Killed));
    assert!(elapsed >= Duration::from_millis(950), "{:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1300), "{:?}", elapsed);
}

#[tokio::test]
async fn test_kill_on_terminal_record_is_noop() {
    let pm = manager(quiet_limits());
    let mut events = pm.subscribe();

    pm.execute(sh("true")).await.unwrap();
    let id = match events.recv().await.unwrap() {
        LifecycleEvent::ProcessStarted { id, .. } => id,
        other => panic!("unexpected event {:?}", other),
    };

    let before = pm.get_stats().processes;
    assert!(!pm.kill_process(&id, KillMode::Graceful));
    assert!(!pm.kill_process(&id, KillMode::Forceful));
    assert_eq!(pm.force_kill_process(&id), Ok(false));
    assert_eq!(pm.kill_all_processes(), 0);

    let info = pm.get_process_info(&id).unwrap();
    assert_eq!(info.status, ProcessStatus::Completed);
    assert_eq!(pm.get_stats().processes, before);
}

#[tokio::test]
async fn test_stats_after_mixed_outcomes() {
    let pm = manager(quiet_limits());

    for _ in 0..3 {
        pm.execute(sh("true")).await.unwrap();
    }
    assert!(pm.execute(sh("false")).await.is_err());

    let stats = pm.get_stats();
    assert_eq!(stats.processes.total_processes, 4);
    assert_eq!(stats.processes.completed_processes, 3);
    assert_eq!(stats.processes.failed_processes, 1);
    assert_eq!(stats.processes.active_processes, 0);
    assert!(stats.host.cpu_count >= 1);
}

#[tokio::test]
async fn test_lifecycle_events_and_retention() {
    let pm = Arc::new(
        ProcessManager::builder()
            .with_limits(quiet_limits())
            .with_retention(Duration::from_millis(200))
            .build(),
    );
    let mut events = pm.subscribe();

    pm.execute(sh("echo hi")).await.unwrap();

    let id = match events.recv().await.unwrap() {
        LifecycleEvent::ProcessStarted { id, command, pid, .. } => {
            assert_eq!(command, "echo hi");
            assert!(pid.is_some());
            id
        }
        other => panic!("unexpected event {:?}", other),
    };
    assert_eq!(
        events.recv().await.unwrap(),
        LifecycleEvent::ProcessExited {
            id: id.clone(),
            status: ProcessStatus::Completed
        }
    );

    let info = pm.get_process_info(&id).unwrap();
    assert_eq!(info.exit_code, Some(0));
    assert!(info.ended_at.is_some());

    let cleaned = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cleaned, LifecycleEvent::ProcessCleanedUp { id: id.clone() });
    assert!(pm.get_process_info(&id).is_none());
}

#[tokio::test]
async fn test_limits_are_copied_at_launch() {
    let pm = manager(quiet_limits());
    let mut events = pm.subscribe();

    let run = tokio::spawn({
        let pm = pm.clone();
        async move { pm.execute(sh("sleep 5")).await }
    });
    let id = match events.recv().await.unwrap() {
        LifecycleEvent::ProcessStarted { id, .. } => id,
        other => panic!("unexpected event {:?}", other),
    };

    pm.update_limits(LimitsUpdate {
        max_process_memory_mb: Some(64),
        ..Default::default()
    });

    assert_eq!(pm.get_limits().max_process_memory_mb, 64);
    assert_eq!(
        pm.get_process_info(&id).unwrap().max_memory_mb,
        ProcessLimits::default().max_process_memory_mb
    );

    assert_eq!(pm.force_kill_process(&id), Ok(true));
    assert!(run.await.unwrap().is_err());
}

#[tokio::test]
async fn test_shutdown_leaves_nothing_behind() {
    let pm = manager(quiet_limits());
    let mut events = pm.subscribe();

    let runs: Vec<_> = (0..2)
        .map(|_| {
            let pm = pm.clone();
            tokio::spawn(async move { pm.execute(sh("sleep 30")).await })
        })
        .collect();

    let mut pids = Vec::new();
    while pids.len() < 2 {
        if let LifecycleEvent::ProcessStarted { pid, .. } = events.recv().await.unwrap() {
            pids.push(pid.unwrap());
        }
    }

    pm.shutdown().await;
    assert!(pm.get_processes().is_empty());

    for run in runs {
        let err = run.await.unwrap().unwrap_err();
        assert_eq!(err.terminal_status(), Some(ProcessStatus::Killed));
    }
    for pid in pids {
        let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
        assert!(!alive, "pid {} survived shutdown", pid);
    }

    pm.shutdown().await;
    assert_eq!(pm.execute(sh("true")).await, Err(ExecError::ShutDown));
}
