/*!
 * Monitoring
 * Structured tracing and live host resource snapshots
 */

pub mod host;
mod tracer;

pub use host::HostSnapshot;
pub use tracer::{command_span, init_tracing, TRACE_JSON_ENV};
