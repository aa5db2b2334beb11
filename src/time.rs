//! Time abstraction for testability.
//!
//! This module provides a [`Clock`] trait that allows injecting controlled
//! clocks in tests while using the real system clock in production, and a
//! [`Sleeper`] trait so retry delays can be skipped in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Abstraction over system time for testability.
///
/// Implementations provide the current time, allowing tests to inject
/// controlled time values instead of relying on actual system time.
///
/// # Example
///
/// ```
/// use reachguard::time::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let now = clock.now();
/// assert!(now >= std::time::SystemTime::UNIX_EPOCH);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;

    /// Returns monotonic time, unaffected by wall-clock steps.
    ///
    /// Use it for windows that are never persisted.
    fn instant(&self) -> Instant;
}

/// Production clock using actual system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

/// A manually driven clock.
///
/// Clones share the same underlying time, so a test can hand one clone to
/// the component under test and advance the other. [`advance`](Self::advance)
/// moves both readings; [`set_secs`](Self::set_secs) steps only the wall
/// clock, the way an NTP correction would.
///
/// ```
/// use reachguard::time::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::at_secs(100);
/// let shared = clock.clone();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(shared.elapsed_millis(), 105_000);
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    /// Milliseconds since `UNIX_EPOCH`.
    millis: Arc<AtomicU64>,
    /// Milliseconds advanced since `origin`.
    ticks: Arc<AtomicU64>,
    origin: Instant,
}

impl ManualClock {
    /// Creates a clock positioned `secs` seconds after the Unix epoch.
    #[must_use]
    pub fn at_secs(secs: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(secs.saturating_mul(1000))),
            ticks: Arc::new(AtomicU64::new(0)),
            origin: Instant::now(),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(millis, Ordering::SeqCst);
        self.ticks.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jumps the wall clock to an absolute number of seconds after the
    /// epoch. Monotonic time does not move.
    pub fn set_secs(&self, secs: u64) {
        self.millis.store(secs.saturating_mul(1000), Ordering::SeqCst);
    }

    /// Returns the current position in milliseconds since the epoch.
    #[must_use]
    pub fn elapsed_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_secs(0)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(self.elapsed_millis())
    }

    fn instant(&self) -> Instant {
        self.origin + Duration::from_millis(self.ticks.load(Ordering::SeqCst))
    }
}

/// Abstraction over async sleeping, used between notifier retries.
pub trait Sleeper: Send + Sync {
    /// Sleeps for the given duration.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Production sleeper backed by [`tokio::time::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately. Useful in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSleeper;

impl Sleeper for InstantSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

/// Converts a timestamp to milliseconds since the Unix epoch.
///
/// Pre-epoch timestamps map to 0.
#[must_use]
pub fn to_unix_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Converts milliseconds since the Unix epoch back to a timestamp.
#[must_use]
pub fn from_unix_millis(millis: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
}

/// Returns how long ago `earlier` was, relative to `now`.
///
/// A clock that stepped backwards yields zero rather than an error.
#[must_use]
pub fn elapsed_since(now: SystemTime, earlier: SystemTime) -> Duration {
    now.duration_since(earlier).unwrap_or(Duration::ZERO)
}
