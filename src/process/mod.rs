/*!
 * Process Module
 * Admission, launch, supervision, sampling and cleanup of OS processes
 */

mod cleanup;
pub mod config;
pub mod escalation;
pub mod launcher;
pub mod manager;
pub mod manager_builder;
mod monitor_task;
mod periodic;
mod registry;
pub mod resources;
mod state;
mod supervisor;
pub mod terminal;
pub mod types;

// Re-export for convenience
pub use config::{LimitsUpdate, ProcessLimits};
pub use escalation::{Escalation, EscalationAction};
pub use launcher::InvocationPlan;
pub use manager::ProcessManager;
pub use manager_builder::ProcessManagerBuilder;
pub use registry::{derive_status, ExitOutcome, KillReason};
pub use resources::{HeuristicSampler, ResourceSampler, ResourceUsage, SampleError};
pub use types::*;
