/*!
 * Shared helpers for process tests
 */

use process_runner::process::{ResourceSampler, ResourceUsage, SampleError};
use process_runner::{ExecuteOptions, ExecuteRequest, ProcessLimits, ProcessManager};
use std::sync::Arc;
use std::time::Duration;

/// A shell line; background mode runs it through `sh -c` as-is
pub fn sh(line: &str) -> ExecuteRequest {
    ExecuteRequest::new(line)
}

pub fn sh_with(line: &str, options: ExecuteOptions) -> ExecuteRequest {
    ExecuteRequest::new(line).with_options(options)
}

/// Limits with the background loops parked unless a test opts in
pub fn quiet_limits() -> ProcessLimits {
    ProcessLimits {
        resource_check_interval_ms: 0,
        cleanup_interval_ms: 0,
        ..ProcessLimits::default()
    }
}

pub fn manager(limits: ProcessLimits) -> Arc<ProcessManager> {
    Arc::new(ProcessManager::new(limits))
}

/// Poll `cond` every 10ms until it holds or `within` elapses
pub async fn wait_until<F>(within: Duration, cond: F) -> bool
where
    F: Fn() -> bool,
{
    let give_up = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < give_up {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Sampler reporting the same measured usage for every pid
pub struct FixedSampler(pub ResourceUsage);

impl ResourceSampler for FixedSampler {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn sample(&self, _pid: u32) -> Result<ResourceUsage, SampleError> {
        Ok(self.0)
    }
}

/// Sampler that always fails, forcing the heuristic
pub struct BrokenSampler;

impl ResourceSampler for BrokenSampler {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn sample(&self, pid: u32) -> Result<ResourceUsage, SampleError> {
        Err(SampleError::NotFound(pid))
    }
}
