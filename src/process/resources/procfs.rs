/*!
 * Linux procfs Sampler
 *
 * Memory from `VmRSS` in `/proc/<pid>/status`. CPU from `utime + stime` in
 * `/proc/<pid>/stat`, reported as the delta against the previous sample of
 * the same pid so consecutive ticks are comparable. The first sample of a
 * pid falls back to the lifetime average.
 *
 * When the pid leads its own process group, both figures cover every live
 * member of the group, so work forked by a shell line is measured too.
 */

use super::{ResourceSampler, ResourceUsage, SampleError};
use crate::core::types::OsPid;
use nix::unistd::{sysconf, SysconfVar};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::time::Instant;

/// Kernel USER_HZ on every mainstream architecture
const FALLBACK_CLOCK_TICKS: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
struct CpuSample {
    ticks: u64,
    at: Instant,
}

pub struct ProcfsSampler {
    clock_ticks: f64,
    previous: Mutex<HashMap<OsPid, CpuSample>>,
}

impl ProcfsSampler {
    pub fn new() -> Self {
        let clock_ticks = match sysconf(SysconfVar::CLK_TCK) {
            Ok(Some(ticks)) if ticks > 0 => ticks as f64,
            _ => FALLBACK_CLOCK_TICKS,
        };
        Self {
            clock_ticks,
            previous: Mutex::new(HashMap::new()),
        }
    }

    fn read_proc(pid: OsPid, file: &str) -> Result<String, SampleError> {
        fs::read_to_string(format!("/proc/{}/{}", pid, file)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SampleError::NotFound(pid),
            _ => SampleError::Io(e),
        })
    }

    fn cpu_percent(&self, pid: OsPid, ticks: u64, start_time: u64) -> Result<f64, SampleError> {
        let now = Instant::now();
        let current = CpuSample { ticks, at: now };
        let previous = self.previous.lock().insert(pid, current);

        let (cpu_secs, wall_secs) = match previous {
            Some(prev) if now > prev.at => (
                current.ticks.saturating_sub(prev.ticks) as f64 / self.clock_ticks,
                now.duration_since(prev.at).as_secs_f64(),
            ),
            _ => {
                let uptime = read_uptime()?;
                let started = start_time as f64 / self.clock_ticks;
                (current.ticks as f64 / self.clock_ticks, uptime - started)
            }
        };

        if wall_secs <= 0.0 {
            return Ok(0.0);
        }
        Ok(cpu_secs / wall_secs * 100.0)
    }
}

impl Default for ProcfsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for ProcfsSampler {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn sample(&self, pid: OsPid) -> Result<ResourceUsage, SampleError> {
        let leader = parse_stat(&Self::read_proc(pid, "stat")?)?;
        let mut rss_kb = parse_vm_rss_kb(&Self::read_proc(pid, "status")?)?;
        let mut ticks = leader.utime + leader.stime;

        if leader.pgrp == u64::from(pid) {
            for (member, stat) in group_members(pid) {
                // Members may exit between the scan and this read
                let Ok(status) = Self::read_proc(member, "status") else {
                    continue;
                };
                rss_kb += parse_vm_rss_kb(&status).unwrap_or(0);
                ticks += stat.utime + stat.stime;
            }
        }

        let cpu = self.cpu_percent(pid, ticks, leader.start_time)?;
        Ok(ResourceUsage::measured(rss_kb as f64 / 1024.0, cpu))
    }

    fn forget(&self, pid: OsPid) {
        self.previous.lock().remove(&pid);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StatFields {
    pgrp: u64,
    utime: u64,
    stime: u64,
    start_time: u64,
}

/// `VmRSS:     1234 kB`; kernel threads and zombies have no VmRSS line
fn parse_vm_rss_kb(status: &str) -> Result<u64, SampleError> {
    let Some(line) = status.lines().find(|l| l.starts_with("VmRSS:")) else {
        return Ok(0);
    };
    line.split_whitespace()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SampleError::Parse(line.to_string()))
}

/// Fields 5, 14, 15 and 22 of `/proc/<pid>/stat`. `comm` (field 2) may hold
/// spaces and parentheses, so counting starts after the last ')'.
fn parse_stat(stat: &str) -> Result<StatFields, SampleError> {
    let rest = stat
        .rfind(')')
        .map(|i| &stat[i + 1..])
        .ok_or_else(|| SampleError::Parse("missing comm terminator".into()))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();

    // fields[0] is field 3 (state)
    let field = |n: usize| -> Result<u64, SampleError> {
        fields
            .get(n - 3)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| SampleError::Parse(format!("stat field {}", n)))
    };

    Ok(StatFields {
        pgrp: field(5)?,
        utime: field(14)?,
        stime: field(15)?,
        start_time: field(22)?,
    })
}

/// Every other process whose group id is `pgid`
fn group_members(pgid: OsPid) -> Vec<(OsPid, StatFields)> {
    let Ok(entries) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<OsPid>().ok())
        .filter(|&pid| pid != pgid)
        .filter_map(|pid| {
            let stat = parse_stat(&ProcfsSampler::read_proc(pid, "stat").ok()?).ok()?;
            (stat.pgrp == u64::from(pgid)).then_some((pid, stat))
        })
        .collect()
}

fn read_uptime() -> Result<f64, SampleError> {
    let raw = fs::read_to_string("/proc/uptime")?;
    raw.split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| SampleError::Parse(raw.clone()))
}
