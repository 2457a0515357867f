/*!
 * Host Snapshot
 * Live machine resources reported alongside the process counters
 */

use crate::core::types::bytes_to_mb;
use serde::{Deserialize, Serialize};
use sysinfo::{ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Point-in-time view of the host, for callers that self-regulate admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSnapshot {
    pub total_memory_mb: f64,
    pub free_memory_mb: f64,
    /// All zeros on platforms without a load average
    pub load_average: LoadAverage,
    pub platform: String,
    pub arch: String,
    pub cpu_count: usize,
    /// This process's resident memory
    pub own_memory_mb: f64,
    pub own_uptime_secs: u64,
}

impl HostSnapshot {
    pub fn capture() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let load = System::load_average();
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        let (own_memory_mb, own_uptime_secs) = match sysinfo::get_current_pid() {
            Ok(pid) => {
                system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
                system
                    .process(pid)
                    .map(|p| (bytes_to_mb(p.memory()), p.run_time()))
                    .unwrap_or((0.0, 0))
            }
            Err(_) => (0.0, 0),
        };

        Self {
            total_memory_mb: bytes_to_mb(system.total_memory()),
            free_memory_mb: bytes_to_mb(system.available_memory()),
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            cpu_count,
            own_memory_mb,
            own_uptime_secs,
        }
    }
}
