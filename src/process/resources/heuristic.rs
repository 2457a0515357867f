/*!
 * Heuristic Sampler
 * Age-based estimate used when no platform data is available
 */

use super::{ResourceSampler, ResourceUsage, SampleError};
use crate::core::limits::{
    HEURISTIC_BASE_MEMORY_MB, HEURISTIC_MAX_MEMORY_MB, HEURISTIC_MEMORY_GROWTH_MB_PER_MIN,
};
use crate::core::types::OsPid;
use std::time::Duration;

/// Small base estimate growing slowly with process age; CPU is unknown
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSampler;

impl HeuristicSampler {
    pub fn estimate(&self, age: Duration) -> ResourceUsage {
        let minutes = age.as_secs_f64() / 60.0;
        let memory_mb = (HEURISTIC_BASE_MEMORY_MB + minutes * HEURISTIC_MEMORY_GROWTH_MB_PER_MIN)
            .min(HEURISTIC_MAX_MEMORY_MB);

        ResourceUsage {
            memory_mb,
            cpu_percent: None,
            estimated: true,
        }
    }
}

impl ResourceSampler for HeuristicSampler {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    /// Without an age the estimate is the base value
    fn sample(&self, _pid: OsPid) -> Result<ResourceUsage, SampleError> {
        Ok(self.estimate(Duration::ZERO))
    }
}
