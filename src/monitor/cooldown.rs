//! Minimum interval between two notifications to the same user.

use std::time::{Duration, SystemTime};

use super::MonitoredEndpoint;
use crate::time::elapsed_since;

/// Gate that spaces out notifications for one endpoint.
///
/// The guard has no storage of its own; it reads
/// [`MonitoredEndpoint::last_notification_at`]. One clock is shared by
/// "went up" and "went down" notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationCooldown {
    window: Duration,
}

impl NotificationCooldown {
    /// Default cooldown between notifications.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

    /// Creates a cooldown with the given window.
    #[must_use]
    pub const fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Returns the cooldown window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns true if a notification may be dispatched at `now`.
    #[must_use]
    pub fn may_send(&self, endpoint: &MonitoredEndpoint, now: SystemTime) -> bool {
        self.remaining(endpoint, now).is_none()
    }

    /// Returns how long the caller must still wait, if at all.
    ///
    /// An endpoint that was never notified is never cooling down.
    #[must_use]
    pub fn remaining(&self, endpoint: &MonitoredEndpoint, now: SystemTime) -> Option<Duration> {
        let last = endpoint.last_notification_at()?;
        let elapsed = elapsed_since(now, last);
        (elapsed < self.window).then(|| self.window - elapsed)
    }
}

impl Default for NotificationCooldown {
    fn default() -> Self {
        Self::new(Self::DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::Reachability;
    use crate::time::from_unix_millis;

    fn notified_at(secs: u64) -> MonitoredEndpoint {
        let mut endpoint = MonitoredEndpoint::new("8.8.8.8", 0);
        endpoint.record_notification(Reachability::Up, from_unix_millis(secs * 1000));
        endpoint
    }

    #[test]
    fn never_notified_may_send() {
        let endpoint = MonitoredEndpoint::new("8.8.8.8", 0);
        let cooldown = NotificationCooldown::default();

        assert!(cooldown.may_send(&endpoint, from_unix_millis(0)));
        assert_eq!(cooldown.remaining(&endpoint, from_unix_millis(0)), None);
    }

    #[test]
    fn suppresses_inside_window() {
        let endpoint = notified_at(1_000);
        let cooldown = NotificationCooldown::default();

        let now = from_unix_millis(1_059_000);
        assert!(!cooldown.may_send(&endpoint, now));
        assert_eq!(cooldown.remaining(&endpoint, now), Some(Duration::from_secs(1)));
    }

    #[test]
    fn allows_exactly_at_window_end() {
        let endpoint = notified_at(1_000);
        let cooldown = NotificationCooldown::default();

        assert!(cooldown.may_send(&endpoint, from_unix_millis(1_060_000)));
    }

    #[test]
    fn clock_stepping_back_keeps_full_window() {
        let endpoint = notified_at(1_000);
        let cooldown = NotificationCooldown::default();

        let earlier = from_unix_millis(900_000);
        assert_eq!(
            cooldown.remaining(&endpoint, earlier),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn custom_window_is_respected() {
        let endpoint = notified_at(0);
        let cooldown = NotificationCooldown::new(Duration::from_secs(5));

        assert!(!cooldown.may_send(&endpoint, from_unix_millis(4_999)));
        assert!(cooldown.may_send(&endpoint, from_unix_millis(5_000)));
    }
}
