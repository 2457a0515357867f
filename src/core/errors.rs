/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::process::types::ProcessStatus;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for runner operations
pub type ExecResult<T> = Result<T, ExecError>;

/// Every failure an `execute()` or kill call can surface
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ExecError {
    #[error("Maximum concurrent processes reached ({active}/{limit})")]
    #[diagnostic(
        code(exec::resource_exhausted),
        help("Wait for running commands to finish or raise max_concurrent_processes.")
    )]
    ResourceExhausted { active: usize, limit: usize },

    #[error("Command rejected by security policy: {0}")]
    #[diagnostic(code(exec::security_rejected))]
    SecurityRejected(String),

    #[error("Failed to spawn '{command}': {reason}")]
    #[diagnostic(
        code(exec::spawn_failure),
        help("Check that the command exists and the working directory is valid.")
    )]
    SpawnFailure { command: String, reason: String },

    #[error("Process {status}{}", terminated_suffix(.exit_code, .signal))]
    #[diagnostic(code(exec::process_terminated))]
    ProcessTerminated {
        status: ProcessStatus,
        exit_code: Option<i32>,
        signal: Option<String>,
        stderr: String,
    },

    #[error("Failed to signal process {id}: {reason}")]
    #[diagnostic(code(exec::kill_failure))]
    KillFailure { id: String, reason: String },

    #[error("Process runner is shut down")]
    #[diagnostic(code(exec::shut_down))]
    ShutDown,
}

impl ExecError {
    /// Terminal status carried by a `ProcessTerminated` error
    pub fn terminal_status(&self) -> Option<ProcessStatus> {
        match self {
            ExecError::ProcessTerminated { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn terminated_suffix(exit_code: &Option<i32>, signal: &Option<String>) -> String {
    let mut suffix = String::new();
    if let Some(code) = exit_code {
        suffix.push_str(&format!(" (exit code {})", code));
    }
    if let Some(signal) = signal {
        suffix.push_str(&format!(" (signal {})", signal));
    }
    suffix
}

/// Configuration loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    #[diagnostic(code(config::invalid_env))]
    InvalidEnv { key: String, value: String },

    #[error("Invalid limits update: {0}")]
    #[diagnostic(code(config::invalid_update))]
    InvalidUpdate(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::InvalidUpdate(err.to_string())
    }
}
