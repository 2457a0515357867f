/*!
 * Resource Sampling
 * Per-process memory/CPU inspection with one strategy per platform family
 *
 * - Linux: `/proc/<pid>` with a windowed CPU delta between samples
 * - macOS / BSD: `ps -o rss=,%cpu=`
 * - Everything else (Windows): `sysinfo`
 * - Heuristic: universal fallback when the platform strategy fails
 */

mod heuristic;
#[cfg(target_os = "linux")]
mod procfs;
#[cfg(unix)]
mod ps;
mod sysinfo_probe;

pub use heuristic::HeuristicSampler;
#[cfg(target_os = "linux")]
pub use procfs::ProcfsSampler;
#[cfg(unix)]
pub use ps::PsSampler;
pub use sysinfo_probe::SysinfoSampler;

use crate::core::types::OsPid;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Sampling errors never escape the monitor loop
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("Process {0} not found")]
    NotFound(OsPid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unparseable output: {0}")]
    Parse(String),

    #[error("Sampling not supported: {0}")]
    Unsupported(&'static str),
}

/// Usage observed for one process
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_mb: f64,
    /// `None` when unknown
    pub cpu_percent: Option<f64>,
    /// True for heuristic estimates, which are never enforced
    #[serde(default)]
    pub estimated: bool,
}

impl ResourceUsage {
    pub fn measured(memory_mb: f64, cpu_percent: f64) -> Self {
        Self {
            memory_mb,
            cpu_percent: Some(cpu_percent),
            estimated: false,
        }
    }
}

/// Platform capability: read a process's current memory and CPU usage
pub trait ResourceSampler: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Sample a live process. May block briefly; callers run it off the async threads.
    fn sample(&self, pid: OsPid) -> Result<ResourceUsage, SampleError>;

    /// Drop any per-process state after exit
    fn forget(&self, _pid: OsPid) {}
}

/// Sample `pid`, degrading to the heuristic on failure or when there is no pid
pub fn sample_or_estimate(
    sampler: &dyn ResourceSampler,
    fallback: &HeuristicSampler,
    pid: Option<OsPid>,
    age: Duration,
) -> ResourceUsage {
    let Some(pid) = pid else {
        return fallback.estimate(age);
    };

    match sampler.sample(pid) {
        Ok(usage) => usage,
        Err(e) => {
            tracing::debug!(pid, sampler = sampler.name(), error = %e, "Sampling failed, using estimate");
            fallback.estimate(age)
        }
    }
}

/// Strategy for the platform this binary was built for
pub fn platform_sampler() -> Arc<dyn ResourceSampler> {
    #[cfg(target_os = "linux")]
    {
        Arc::new(ProcfsSampler::new())
    }

    #[cfg(all(
        unix,
        any(
            target_os = "macos",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd",
            target_os = "dragonfly"
        )
    ))]
    {
        Arc::new(PsSampler::new())
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    )))]
    {
        Arc::new(SysinfoSampler::new())
    }
}
