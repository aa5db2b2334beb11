//! Stabilization policy for endpoint transitions.

use std::time::Duration;

/// Policy deciding how long a new reading must hold before it counts.
///
/// Debouncing keeps rapid flapping from turning into notification storms:
/// every new reading restarts the window, so only a signal that stays put
/// for the whole window is treated as a real transition.
///
/// # Window Selection
///
/// | `debounce_minutes` | Effective window |
/// |--------------------|------------------|
/// | 0 | `minimum` (30 s by default) |
/// | n > 0 | `max(n minutes, minimum)` |
///
/// A zero setting never means "instant": a single poll can not confirm
/// a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizationPolicy {
    /// Floor applied to every window.
    minimum: Duration,
}

impl StabilizationPolicy {
    /// Default minimum stabilization window.
    pub const DEFAULT_MINIMUM: Duration = Duration::from_secs(30);

    /// Creates a policy with the given minimum window.
    #[must_use]
    pub const fn new(minimum: Duration) -> Self {
        Self { minimum }
    }

    /// Returns the minimum window.
    #[must_use]
    pub const fn minimum(&self) -> Duration {
        self.minimum
    }

    /// Returns the effective window for a user's debounce setting.
    #[must_use]
    pub fn window_for(&self, debounce_minutes: u32) -> Duration {
        if debounce_minutes == 0 {
            return self.minimum;
        }
        Duration::from_secs(u64::from(debounce_minutes) * 60).max(self.minimum)
    }
}

impl Default for StabilizationPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MINIMUM)
    }
}
