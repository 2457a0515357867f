/*!
 * Process Registry
 * Single owner of all mutable process state: records, counters, admission slots
 */

use super::types::{ProcessInfo, ProcessManagerStats, ProcessStatus};
use crate::core::errors::{ExecError, ExecResult};
use crate::core::types::{to_timestamp_ms, OsPid, ProcessId};
use crate::process::config::ProcessLimits;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Requests delivered to a process supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Graceful termination, forceful after `grace`
    Terminate { grace: Duration },
    /// Forceful termination now
    Kill,
}

/// Why the runner asked a process to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    Timeout,
    Requested,
    ResourceLimit,
    Shutdown,
}

/// The only way to reach the OS process; never leaves this module tree
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    control: mpsc::UnboundedSender<ProcessSignal>,
}

impl ProcessHandle {
    pub(crate) fn new(control: mpsc::UnboundedSender<ProcessSignal>) -> Self {
        Self { control }
    }

    fn send(&self, signal: ProcessSignal) -> bool {
        self.control.send(signal).is_ok()
    }
}

/// One running or recently terminated process
#[derive(Debug)]
pub(crate) struct ProcessRecord {
    pub id: ProcessId,
    pub command: String,
    pub args: Vec<String>,
    pub pid: Option<OsPid>,
    pub started_at: SystemTime,
    pub started: Instant,
    pub ended_at: Option<SystemTime>,
    pub ended: Option<Instant>,
    pub status: ProcessStatus,
    pub memory_usage_mb: f64,
    pub cpu_usage_percent: Option<f64>,
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,
    pub deadline: Option<Instant>,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub kill_reason: Option<KillReason>,
    handle: ProcessHandle,
}

impl ProcessRecord {
    /// Limits are copied in so later `update_limits` calls leave this process's contract alone
    pub(crate) fn new(
        id: ProcessId,
        command: String,
        args: Vec<String>,
        pid: Option<OsPid>,
        limits: &ProcessLimits,
        deadline: Instant,
        handle: ProcessHandle,
    ) -> Self {
        Self {
            id,
            command,
            args,
            pid,
            started_at: SystemTime::now(),
            started: Instant::now(),
            ended_at: None,
            ended: None,
            status: ProcessStatus::Running,
            memory_usage_mb: 0.0,
            cpu_usage_percent: None,
            max_memory_mb: limits.max_process_memory_mb,
            max_cpu_percent: limits.max_process_cpu_percent,
            deadline: Some(deadline),
            exit_code: None,
            signal: None,
            kill_reason: None,
            handle,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.status == ProcessStatus::Running
    }

    pub(crate) fn info(&self) -> ProcessInfo {
        ProcessInfo {
            id: self.id.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
            pid: self.pid,
            started_at: to_timestamp_ms(self.started_at),
            ended_at: self.ended_at.map(to_timestamp_ms),
            status: self.status,
            memory_usage_mb: self.memory_usage_mb,
            cpu_usage_percent: self.cpu_usage_percent,
            max_memory_mb: self.max_memory_mb,
            max_cpu_percent: self.max_cpu_percent,
            exit_code: self.exit_code,
            signal: self.signal.clone(),
        }
    }

    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        match self.ended {
            Some(ended) => self.status.is_terminal() && now.saturating_duration_since(ended) >= retention,
            None => false,
        }
    }
}

/// How the OS reported the end of a process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
}

/// Derive the terminal status of an exited process.
///
/// The runner's own deadline path wins, then any kill (ours or an outside
/// signal), then the exit code.
pub fn derive_status(kill_reason: Option<KillReason>, outcome: &ExitOutcome) -> ProcessStatus {
    match kill_reason {
        Some(KillReason::Timeout) => ProcessStatus::Timeout,
        Some(_) => ProcessStatus::Killed,
        None if outcome.signal.is_some() => ProcessStatus::Killed,
        None if outcome.exit_code == Some(0) => ProcessStatus::Completed,
        None => ProcessStatus::Failed,
    }
}

/// Snapshot of a finalized record, handed back to the supervisor
#[derive(Debug, Clone, Copy)]
pub(crate) struct Finalized {
    pub status: ProcessStatus,
    pub execution_time: Duration,
}

/// Identity of a running process for one sampler pass
#[derive(Debug, Clone)]
pub(crate) struct SampleTarget {
    pub id: ProcessId,
    pub pid: Option<OsPid>,
    pub age: Duration,
}

/// Mapping from id to record plus monotonic counters
#[derive(Debug, Default)]
pub(crate) struct Registry {
    records: HashMap<ProcessId, ProcessRecord>,
    /// Admission slots handed out but not yet registered
    reserved: usize,
    stats: ProcessManagerStats,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn running_count(&self) -> usize {
        self.records.values().filter(|r| r.is_running()).count()
    }

    /// Claim a slot; running + reserved may never exceed `limit`
    fn reserve(&mut self, limit: usize) -> ExecResult<()> {
        let active = self.running_count() + self.reserved;
        if active >= limit {
            return Err(ExecError::ResourceExhausted { active, limit });
        }
        self.reserved += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    fn insert(&mut self, record: ProcessRecord) {
        self.release();
        self.stats.total_processes += 1;
        self.stats.active_processes += 1;
        self.records.insert(record.id.clone(), record);
    }

    pub(crate) fn get(&self, id: &str) -> Option<&ProcessRecord> {
        self.records.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ProcessRecord> {
        self.records.get_mut(id)
    }

    pub(crate) fn infos(&self) -> Vec<ProcessInfo> {
        self.records.values().map(ProcessRecord::info).collect()
    }

    pub(crate) fn running_ids(&self) -> Vec<ProcessId> {
        self.records
            .values()
            .filter(|r| r.is_running())
            .map(|r| r.id.clone())
            .collect()
    }

    pub(crate) fn sample_targets(&self, now: Instant) -> Vec<SampleTarget> {
        self.records
            .values()
            .filter(|r| r.is_running())
            .map(|r| SampleTarget {
                id: r.id.clone(),
                pid: r.pid,
                age: now.saturating_duration_since(r.started),
            })
            .collect()
    }

    /// Ask a running process to stop. The first reason recorded wins.
    /// Returns false for unknown or terminal records.
    pub(crate) fn signal(&mut self, id: &str, signal: ProcessSignal, reason: KillReason) -> ExecResult<bool> {
        let Some(record) = self.records.get_mut(id) else {
            return Ok(false);
        };
        if !record.is_running() {
            return Ok(false);
        }
        record.kill_reason.get_or_insert(reason);
        if record.handle.send(signal) {
            Ok(true)
        } else {
            Err(ExecError::KillFailure {
                id: id.to_string(),
                reason: "process supervisor is gone".to_string(),
            })
        }
    }

    /// Record that the deadline path is terminating this process
    pub(crate) fn mark_timed_out(&mut self, id: &str) {
        if let Some(record) = self.records.get_mut(id) {
            if record.is_running() {
                record.kill_reason.get_or_insert(KillReason::Timeout);
            }
        }
    }

    /// Move a record to its terminal state. Idempotent: returns `None` when
    /// the record is gone or already terminal.
    pub(crate) fn finalize(&mut self, id: &str, outcome: ExitOutcome) -> Option<Finalized> {
        let record = self.records.get_mut(id)?;
        if record.status.is_terminal() {
            return None;
        }

        let status = derive_status(record.kill_reason, &outcome);
        let now = Instant::now();
        record.status = status;
        record.exit_code = outcome.exit_code;
        record.signal = outcome.signal;
        record.ended = Some(now);
        record.ended_at = Some(SystemTime::now());
        record.deadline = None;
        record.cpu_usage_percent = None;
        let execution_time = now.saturating_duration_since(record.started);

        let stats = &mut self.stats;
        stats.active_processes = stats.active_processes.saturating_sub(1);
        match status {
            ProcessStatus::Completed => stats.completed_processes += 1,
            ProcessStatus::Failed => stats.failed_processes += 1,
            ProcessStatus::Timeout => stats.timeout_processes += 1,
            ProcessStatus::Killed => stats.killed_processes += 1,
            ProcessStatus::Running => {}
        }

        Some(Finalized {
            status,
            execution_time,
        })
    }

    /// Remove one record if it is terminal and past retention
    pub(crate) fn evict_if_expired(&mut self, id: &str, now: Instant, retention: Duration) -> bool {
        let expired = self
            .records
            .get(id)
            .is_some_and(|r| r.is_expired(now, retention));
        if expired {
            self.records.remove(id);
        }
        expired
    }

    /// Remove every terminal record past retention; running records are never touched
    pub(crate) fn evict_expired(&mut self, now: Instant, retention: Duration) -> Vec<ProcessId> {
        let expired: Vec<ProcessId> = self
            .records
            .values()
            .filter(|r| r.is_expired(now, retention))
            .map(|r| r.id.clone())
            .collect();
        for id in &expired {
            self.records.remove(id);
        }
        expired
    }

    /// Refresh the aggregate fields from current contents
    pub(crate) fn recompute_aggregates(&mut self) {
        let running = self.records.values().filter(|r| r.is_running());
        let (mut count, mut memory, mut cpu) = (0usize, 0.0f64, 0.0f64);
        for record in running {
            count += 1;
            memory += record.memory_usage_mb;
            cpu += record.cpu_usage_percent.unwrap_or(0.0);
        }
        self.stats.active_processes = count;
        self.stats.total_memory_usage_mb = memory;
        self.stats.total_cpu_usage = cpu;
    }

    pub(crate) fn stats(&self) -> ProcessManagerStats {
        self.stats.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.reserved = 0;
        self.stats.active_processes = 0;
        self.stats.total_memory_usage_mb = 0.0;
        self.stats.total_cpu_usage = 0.0;
    }
}

/// A claimed admission slot.
///
/// Acquired and consumed without an await in between, so the count check
/// and the registration are one step. Dropping an unconsumed ticket (spawn
/// failure) hands the slot back.
pub(crate) struct AdmissionTicket<'a> {
    registry: &'a Mutex<Registry>,
    consumed: bool,
}

impl<'a> AdmissionTicket<'a> {
    pub(crate) fn acquire(registry: &'a Mutex<Registry>, limit: usize) -> ExecResult<Self> {
        registry.lock().reserve(limit)?;
        Ok(Self {
            registry,
            consumed: false,
        })
    }

    /// Turn the reserved slot into a registered record
    pub(crate) fn register(mut self, record: ProcessRecord) {
        self.registry.lock().insert(record);
        self.consumed = true;
    }
}

impl Drop for AdmissionTicket<'_> {
    fn drop(&mut self) {
        if !self.consumed {
            self.registry.lock().release();
        }
    }
}
