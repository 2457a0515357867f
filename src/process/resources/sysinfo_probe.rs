/*!
 * sysinfo Sampler
 * Windows (and any other target) strategy backed by the `sysinfo` crate.
 * The `System` is kept between calls so CPU usage is a delta across refreshes.
 */

use super::{ResourceSampler, ResourceUsage, SampleError};
use crate::core::types::{bytes_to_mb, OsPid};
use parking_lot::Mutex;
use sysinfo::{Pid as SysPid, ProcessesToUpdate, System};

pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for SysinfoSampler {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn sample(&self, pid: OsPid) -> Result<ResourceUsage, SampleError> {
        let sys_pid = SysPid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

        let process = system.process(sys_pid).ok_or(SampleError::NotFound(pid))?;
        Ok(ResourceUsage::measured(
            bytes_to_mb(process.memory()),
            f64::from(process.cpu_usage()),
        ))
    }
}
