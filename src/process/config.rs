/*!
 * Process Limits Configuration
 * Admission, resource, timeout and loop-interval limits with hot merging
 */

use crate::core::errors::ConfigError;
use crate::core::limits::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable prefix for every limit
pub const ENV_PREFIX: &str = "PROCESS_RUNNER_";

/// Limits read at construction and replaceable through `update_limits`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProcessLimits {
    pub max_concurrent_processes: usize,
    pub max_process_memory_mb: u64,
    pub max_process_cpu_percent: f64,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// 0 disables the cleanup sweeper
    pub cleanup_interval_ms: u64,
    /// 0 disables the resource sampler
    pub resource_check_interval_ms: u64,
    pub process_kill_grace_period_ms: u64,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            max_concurrent_processes: DEFAULT_MAX_CONCURRENT_PROCESSES,
            max_process_memory_mb: DEFAULT_MAX_PROCESS_MEMORY_MB,
            max_process_cpu_percent: DEFAULT_MAX_PROCESS_CPU_PERCENT,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            max_timeout_ms: DEFAULT_MAX_TIMEOUT_MS,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            resource_check_interval_ms: DEFAULT_RESOURCE_CHECK_INTERVAL_MS,
            process_kill_grace_period_ms: DEFAULT_KILL_GRACE_PERIOD_MS,
        }
    }
}

impl ProcessLimits {
    /// Defaults overlaid with `PROCESS_RUNNER_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::default().merged(&LimitsUpdate::from_env()?))
    }

    /// Apply every field present in `update`; last write wins
    pub fn merge(&mut self, update: &LimitsUpdate) {
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = update.$field { self.$field = value; })*
            };
        }
        apply!(
            max_concurrent_processes,
            max_process_memory_mb,
            max_process_cpu_percent,
            default_timeout_ms,
            max_timeout_ms,
            cleanup_interval_ms,
            resource_check_interval_ms,
            process_kill_grace_period_ms,
        );
    }

    pub fn merged(mut self, update: &LimitsUpdate) -> Self {
        self.merge(update);
        self
    }

    /// `min(requested ?? default, max)`
    pub fn effective_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_timeout_ms)
            .min(self.max_timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.process_kill_grace_period_ms)
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        non_zero_interval(self.cleanup_interval_ms)
    }

    pub fn resource_check_interval(&self) -> Option<Duration> {
        non_zero_interval(self.resource_check_interval_ms)
    }
}

fn non_zero_interval(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Partial limits; absent fields leave the current value untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "snake_case")]
pub struct LimitsUpdate {
    pub max_concurrent_processes: Option<usize>,
    pub max_process_memory_mb: Option<u64>,
    pub max_process_cpu_percent: Option<f64>,
    pub default_timeout_ms: Option<u64>,
    pub max_timeout_ms: Option<u64>,
    pub cleanup_interval_ms: Option<u64>,
    pub resource_check_interval_ms: Option<u64>,
    pub process_kill_grace_period_ms: Option<u64>,
}

impl LimitsUpdate {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read every `PROCESS_RUNNER_*` variable that is set
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build an update from an arbitrary key lookup (environment, tests)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            max_concurrent_processes: parse_var(&lookup, "MAX_CONCURRENT")?,
            max_process_memory_mb: parse_var(&lookup, "MAX_MEMORY_MB")?,
            max_process_cpu_percent: parse_var(&lookup, "MAX_CPU_PERCENT")?,
            default_timeout_ms: parse_var(&lookup, "DEFAULT_TIMEOUT_MS")?,
            max_timeout_ms: parse_var(&lookup, "MAX_TIMEOUT_MS")?,
            cleanup_interval_ms: parse_var(&lookup, "CLEANUP_INTERVAL_MS")?,
            resource_check_interval_ms: parse_var(&lookup, "RESOURCE_CHECK_INTERVAL_MS")?,
            process_kill_grace_period_ms: parse_var(&lookup, "KILL_GRACE_PERIOD_MS")?,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn parse_var<T, F>(lookup: &F, suffix: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let key = format!("{}{}", ENV_PREFIX, suffix);
    match lookup(&key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
    }
}
