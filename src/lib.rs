/*!
 * Process Runner Library
 * Runs OS commands under concurrency, memory, CPU and wall-clock limits
 */

pub mod core;
pub mod monitoring;
pub mod process;
pub mod security;

// Re-exports
pub use crate::core::errors::{ConfigError, ExecError, ExecResult};
pub use monitoring::{init_tracing, HostSnapshot};
pub use process::{
    CommandResult, ExecuteOptions, ExecuteRequest, KillMode, LifecycleEvent, LimitsUpdate,
    ProcessInfo, ProcessLimits, ProcessManager, ProcessManagerBuilder, ProcessManagerStats,
    ProcessStatus, Stats, TerminalType,
};
pub use security::{BasicCommandValidator, CommandValidator, PermitAll};
