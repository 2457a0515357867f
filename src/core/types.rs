/*!
 * Core Types
 * Common types used across the runner
 */

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Opaque process identifier handed out at launch
pub type ProcessId = String;

/// OS-level process ID
pub type OsPid = u32;

/// Timestamp in milliseconds since the Unix epoch
pub type TimestampMs = u64;

/// Generate a fresh, unique process identifier
pub fn generate_process_id() -> ProcessId {
    Uuid::new_v4().to_string()
}

/// Milliseconds since the Unix epoch for a wall-clock instant
pub fn to_timestamp_ms(time: SystemTime) -> TimestampMs {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as TimestampMs
}

/// Convert a byte count to megabytes
#[inline]
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
