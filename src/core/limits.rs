/*!
 * System Limits and Constants
 *
 * Centralized location for the runner's defaults, thresholds, and magic numbers.
 * Organized by domain so every tunable has exactly one home.
 */

use std::time::Duration;

// =============================================================================
// ADMISSION
// =============================================================================

/// Maximum number of simultaneously running processes
pub const DEFAULT_MAX_CONCURRENT_PROCESSES: usize = 10;

// =============================================================================
// PER-PROCESS RESOURCE LIMITS
// =============================================================================

/// Memory ceiling per process (512MB); exceeding it is a forceful kill
pub const DEFAULT_MAX_PROCESS_MEMORY_MB: u64 = 512;

/// CPU ceiling per process; exceeding it only warns
pub const DEFAULT_MAX_PROCESS_CPU_PERCENT: f64 = 80.0;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Deadline applied when the caller does not pass one (30s)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Hard ceiling on any caller-supplied deadline (5 minutes)
pub const DEFAULT_MAX_TIMEOUT_MS: u64 = 300_000;

/// Time between a graceful termination request and the forceful one (5s)
pub const DEFAULT_KILL_GRACE_PERIOD_MS: u64 = 5_000;

// =============================================================================
// BACKGROUND LOOPS
// =============================================================================

/// Cleanup sweeper interval (60s)
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;

/// Resource sampler interval (5s)
pub const DEFAULT_RESOURCE_CHECK_INTERVAL_MS: u64 = 5_000;

/// How long a terminal record stays queryable (5 minutes)
pub const RECORD_RETENTION: Duration = Duration::from_secs(5 * 60);

/// How long `shutdown()` waits for killed processes to report their exit
pub const SHUTDOWN_EXIT_WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// OUTPUT CAPTURE
// =============================================================================

/// Per-stream capture ceiling (10MB); excess output is discarded
pub const MAX_CAPTURED_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Upper bound on draining stdout/stderr after the child exits.
/// A backgrounded grandchild can hold the pipe open indefinitely.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Placeholder stdout for visible-terminal launches, which are not captured
pub const VISIBLE_TERMINAL_PLACEHOLDER: &str = "Command launched in a visible terminal window";

// =============================================================================
// SAMPLING HEURISTIC
// =============================================================================

/// Base memory estimate when no platform data is available
pub const HEURISTIC_BASE_MEMORY_MB: f64 = 10.0;

/// Estimated growth per minute of process age
pub const HEURISTIC_MEMORY_GROWTH_MB_PER_MIN: f64 = 1.0;

/// Cap on the heuristic estimate so it can never trip the memory limit on its own
pub const HEURISTIC_MAX_MEMORY_MB: f64 = 100.0;
