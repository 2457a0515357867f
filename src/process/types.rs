/*!
 * Process Types
 * Common types for command execution and process tracking
 */

use crate::core::types::{OsPid, ProcessId, TimestampMs};
use crate::monitoring::host::HostSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle status of a tracked process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// OS process is alive
    Running,
    /// Exited with code 0
    Completed,
    /// Exited with a nonzero code
    Failed,
    /// Killed because its deadline expired
    Timeout,
    /// Killed by an explicit request, a resource limit, or an outside signal
    Killed,
}

impl ProcessStatus {
    /// Terminal statuses never transition again
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProcessStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessStatus::Running => "running",
            ProcessStatus::Completed => "completed",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Timeout => "timeout",
            ProcessStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a kill request should be delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillMode {
    /// Termination request first, forceful kill after the grace period
    #[default]
    Graceful,
    /// Forceful kill right away
    Forceful,
}

/// Terminal emulator used for visible-terminal launches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminalType {
    /// Walk the platform preference list
    #[default]
    Auto,
    GnomeTerminal,
    Konsole,
    Xfce4Terminal,
    XTerminalEmulator,
    Xterm,
    /// macOS Terminal.app
    Terminal,
    /// macOS iTerm2
    Iterm,
    WindowsTerminal,
    Powershell,
    Cmd,
}

/// Per-invocation launch options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ExecuteOptions {
    pub cwd: Option<PathBuf>,
    /// Overrides layered on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub timeout_ms: Option<u64>,
    pub visible_terminal: bool,
    pub terminal_type: Option<TerminalType>,
    pub title: Option<String>,
    pub keep_open: bool,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn in_visible_terminal(mut self, terminal_type: TerminalType) -> Self {
        self.visible_terminal = true;
        self.terminal_type = Some(terminal_type);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_keep_open(mut self, keep_open: bool) -> Self {
        self.keep_open = keep_open;
        self
    }
}

/// A command to run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub options: ExecuteOptions,
}

impl ExecuteRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            options: ExecuteOptions::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }
}

/// Successful command outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
    pub execution_time_ms: u64,
    /// Set when a captured stream hit the capture ceiling
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub truncated: bool,
}

/// Read-only projection of a tracked process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessInfo {
    pub id: ProcessId,
    pub command: String,
    pub args: Vec<String>,
    pub pid: Option<OsPid>,
    pub started_at: TimestampMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<TimestampMs>,
    pub status: ProcessStatus,
    pub memory_usage_mb: f64,
    /// `None` when only a heuristic estimate is available
    pub cpu_usage_percent: Option<f64>,
    pub max_memory_mb: u64,
    pub max_cpu_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
}

/// Registry counters and aggregates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessManagerStats {
    pub total_processes: u64,
    pub completed_processes: u64,
    pub failed_processes: u64,
    pub timeout_processes: u64,
    pub killed_processes: u64,
    pub active_processes: usize,
    pub total_memory_usage_mb: f64,
    pub total_cpu_usage: f64,
}

/// Counters plus a live host snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Stats {
    #[serde(flatten)]
    pub processes: ProcessManagerStats,
    pub host: HostSnapshot,
}

/// Notifications delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ProcessStarted {
        id: ProcessId,
        command: String,
        args: Vec<String>,
        pid: Option<OsPid>,
    },
    ProcessExited {
        id: ProcessId,
        status: ProcessStatus,
    },
    ProcessCleanedUp {
        id: ProcessId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!ProcessStatus::Running.is_terminal());
        assert!(ProcessStatus::Completed.is_terminal());
        assert!(ProcessStatus::Failed.is_terminal());
        assert!(ProcessStatus::Timeout.is_terminal());
        assert!(ProcessStatus::Killed.is_terminal());
    }

    #[test]
    fn test_request_builder() {
        let request = ExecuteRequest::new("ls")
            .with_args(["-la", "/tmp"])
            .with_options(ExecuteOptions::new().with_timeout_ms(1_000).with_env("A", "1"));

        assert_eq!(request.command, "ls");
        assert_eq!(request.args, vec!["-la".to_string(), "/tmp".to_string()]);
        assert_eq!(request.options.timeout_ms, Some(1_000));
        assert_eq!(request.options.env, vec![("A".to_string(), "1".to_string())]);
        assert!(!request.options.visible_terminal);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: ExecuteRequest =
            serde_json::from_str(r#"{"command":"echo","options":{"terminal_type":"gnome-terminal"}}"#)
                .unwrap();
        assert!(request.args.is_empty());
        assert_eq!(request.options.terminal_type, Some(TerminalType::GnomeTerminal));
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = LifecycleEvent::ProcessCleanedUp { id: "abc".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "process_cleaned_up");
        assert_eq!(json["id"], "abc");
    }
}
