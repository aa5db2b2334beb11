//! Backoff schedule for notification delivery.

use std::time::Duration;

/// Exponential backoff between delivery attempts.
///
/// Retries happen inside a single dispatch, so the whole schedule has to fit
/// in the tracker's notify timeout. [`RetryPolicy::worst_case_delay`] gives
/// the total time spent sleeping when every attempt fails.
///
/// # Example
///
/// ```
/// use reachguard::notify::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .with_max_attempts(4)
///     .with_initial_delay(Duration::from_millis(500));
///
/// assert_eq!(policy.delay_for_retry(0), Duration::from_millis(500));
/// assert_eq!(policy.delay_for_retry(1), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always at least 1.
    pub max_attempts: u32,

    /// Sleep before the first retry.
    pub initial_delay: Duration,

    /// Upper bound for any single sleep.
    pub max_delay: Duration,

    /// Growth factor applied after each retry.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Default attempt count.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Default first backoff.
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

    /// Default backoff cap.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);

    /// Default growth factor.
    pub const DEFAULT_MULTIPLIER: f64 = 2.0;

    /// Smallest accepted `max_attempts`.
    pub const MIN_MAX_ATTEMPTS: u32 = 1;

    /// Creates a policy with the defaults above.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
            multiplier: Self::DEFAULT_MULTIPLIER,
        }
    }

    /// A policy that makes exactly one attempt.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self::new().with_max_attempts(1)
    }

    /// Sets the attempt count.
    ///
    /// # Panics
    ///
    /// Panics if `max_attempts` is 0.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        assert!(
            max_attempts >= Self::MIN_MAX_ATTEMPTS,
            "max_attempts must be at least 1"
        );
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the first backoff. Zero is allowed.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    ///
    /// # Panics
    ///
    /// Panics if `multiplier` is not positive.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier > 0.0, "multiplier must be positive");
        self.multiplier = multiplier;
        self
    }

    /// Backoff before retry number `retry` (0 = before the second attempt).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Whether another attempt follows attempt number `attempt` (1-based).
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Total sleep time when every attempt fails.
    #[must_use]
    pub fn worst_case_delay(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|retry| self.delay_for_retry(retry))
            .sum()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
