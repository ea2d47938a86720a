/// Block download configuration constants.
///
/// Defaults for the reservation table and the session download loop.

/// Heights an in-flight reservation may trail the lowest pending one before
/// it is re-offered to another worker.
pub const DEFAULT_MAXIMUM_DEVIATION: u64 = 50;

/// Seconds an assignment may stay outstanding before it is re-offered.
pub const DEFAULT_BLOCK_LATENCY_SECONDS: u64 = 60;

/// Interval between reservation polls of an idle session (in milliseconds).
pub const SESSION_POLL_INTERVAL_MS: u64 = 50;
