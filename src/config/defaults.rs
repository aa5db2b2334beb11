//! Default values for configuration options.
//!
//! Centralized constants to avoid magic numbers scattered across the codebase.

use std::time::Duration;

/// Default HTTP method for notifier requests.
pub const METHOD: &str = "POST";

/// Default polling interval in seconds. Zero selects the dynamic interval.
pub const POLL_INTERVAL_SECS: u64 = 60;

/// Base of the dynamic polling interval in seconds.
pub const DYNAMIC_POLL_BASE_SECS: u64 = 30;

/// Users per extra second of dynamic polling interval.
pub const DYNAMIC_POLL_USERS_PER_SEC: u64 = 10;

/// Upper bound of the dynamic polling interval in seconds.
pub const DYNAMIC_POLL_MAX_SECS: u64 = 300;

/// Default per-request timeout for notifier calls in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default maximum number of delivery attempts.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default initial retry delay in seconds.
pub const RETRY_INITIAL_DELAY_SECS: u64 = 1;

/// Default maximum retry delay in seconds.
pub const RETRY_MAX_DELAY_SECS: u64 = 10;

/// Default retry backoff multiplier.
pub const RETRY_MULTIPLIER: f64 = 2.0;

/// Ports tried by the TCP probe.
pub const PROBE_PORTS: [u16; 2] = [80, 443];

/// Per-port connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 3;

/// Outer timeout around one probe call in seconds.
pub const PROBE_TIMEOUT_SECS: u64 = 10;

/// Timeout for one state write in seconds.
pub const PERSIST_TIMEOUT_SECS: u64 = 5;

/// Time allowed for the final flush at shutdown in seconds.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Default state file location. `~` expands to the home directory.
pub const STATE_FILE: &str = "~/.reachguard/state.json";

/// Default action rate-limit window in milliseconds.
pub const RATE_LIMIT_MS: u64 = 1_000;

/// Default per-action cooldown in seconds.
pub const COOLDOWN_SECS: u64 = 5;

/// Idle time after which guard entries are evicted, in seconds.
pub const RETENTION_SECS: u64 = 30 * 60;

/// Interval between guard sweeps in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Default polling interval as Duration.
#[must_use]
pub const fn poll_interval() -> Duration {
    Duration::from_secs(POLL_INTERVAL_SECS)
}

/// Default request timeout as Duration.
#[must_use]
pub const fn request_timeout() -> Duration {
    Duration::from_secs(REQUEST_TIMEOUT_SECS)
}

/// Default shutdown timeout as Duration.
#[must_use]
pub const fn shutdown_timeout() -> Duration {
    Duration::from_secs(SHUTDOWN_TIMEOUT_SECS)
}

/// Default sweep interval as Duration.
#[must_use]
pub const fn sweep_interval() -> Duration {
    Duration::from_secs(SWEEP_INTERVAL_SECS)
}
