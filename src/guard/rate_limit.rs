//! Uniform per-user rate limit across all interactive actions.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::time::{Clock, SystemClock};

/// Result of [`ActionRateLimiter::check_action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The action may proceed. The user's clock was restarted.
    Allowed,
    /// Too soon after the user's previous action.
    Limited,
}

impl RateDecision {
    /// Returns true for [`RateDecision::Allowed`].
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Reason code for a refusal.
    #[must_use]
    pub const fn reason(self) -> Option<&'static str> {
        match self {
            Self::Allowed => None,
            Self::Limited => Some("cooldown"),
        }
    }
}

/// Anti double-tap limiter.
///
/// One timestamp per user, shared by every action type. Checking and
/// recording happen in the same call under the entry's lock, so two
/// concurrent taps can never both pass. Windows run on monotonic time.
#[derive(Debug)]
pub struct ActionRateLimiter<C = SystemClock> {
    window: Duration,
    clock: C,
    last_action: DashMap<String, Instant>,
}

impl ActionRateLimiter<SystemClock> {
    /// Creates a limiter on the system clock.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, SystemClock)
    }
}

impl<C: Clock> ActionRateLimiter<C> {
    /// Creates a limiter driven by `clock`.
    #[must_use]
    pub fn with_clock(window: Duration, clock: C) -> Self {
        Self {
            window,
            clock,
            last_action: DashMap::new(),
        }
    }

    /// Returns the window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Checks whether `user_id` may act now and, if so, records it.
    ///
    /// `action` is only used for logging; every action shares one clock.
    pub fn check_action(&self, user_id: &str, action: &str) -> RateDecision {
        let now = self.clock.instant();
        match self.last_action.entry(user_id.to_string()) {
            Entry::Occupied(last) if now.saturating_duration_since(*last.get()) < self.window => {
                tracing::debug!("Rate limited {user_id} on '{action}'");
                RateDecision::Limited
            }
            Entry::Occupied(mut last) => {
                last.insert(now);
                RateDecision::Allowed
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                RateDecision::Allowed
            }
        }
    }

    /// Evicts users idle for longer than `retention`. Returns the count.
    pub fn sweep(&self, now: Instant, retention: Duration) -> usize {
        let before = self.last_action.len();
        self.last_action
            .retain(|_, last| now.saturating_duration_since(*last) < retention);
        before.saturating_sub(self.last_action.len())
    }

    /// Number of tracked users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_action.len()
    }

    /// Returns true if no user is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_action.is_empty()
    }
}
