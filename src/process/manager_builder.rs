/*!
 * Process Manager Builder
 * Builder pattern for ProcessManager construction
 */

use super::config::ProcessLimits;
use super::manager::ProcessManager;
use super::resources::{platform_sampler, ResourceSampler};
use super::state::ManagerState;
use crate::core::limits::RECORD_RETENTION;
use crate::security::{BasicCommandValidator, CommandValidator};
use std::sync::Arc;
use std::time::Duration;

/// Builder for ProcessManager
pub struct ProcessManagerBuilder {
    limits: ProcessLimits,
    validator: Option<Arc<dyn CommandValidator>>,
    sampler: Option<Arc<dyn ResourceSampler>>,
    retention: Duration,
}

impl ProcessManagerBuilder {
    pub fn new() -> Self {
        Self {
            limits: ProcessLimits::default(),
            validator: None,
            sampler: None,
            retention: RECORD_RETENTION,
        }
    }

    pub fn with_limits(mut self, limits: ProcessLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the default `BasicCommandValidator`
    pub fn with_validator(mut self, validator: Arc<dyn CommandValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Replace the platform resource sampler
    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// How long finished records stay queryable
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Build and start the background loops. Requires a Tokio runtime.
    pub fn build(self) -> ProcessManager {
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(BasicCommandValidator));
        let sampler = self.sampler.unwrap_or_else(platform_sampler);

        ProcessManager::from_state(ManagerState::new(
            self.limits,
            sampler,
            validator,
            self.retention,
        ))
    }
}

impl Default for ProcessManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
