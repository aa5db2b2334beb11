//! Per-action cooldowns with separate check and record steps.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::time::{Clock, SystemClock};

/// Result of [`ActionCooldownManager::check_cooldown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownStatus {
    /// The action may be performed.
    Ready,
    /// The action was performed too recently.
    CoolingDown {
        /// Whole seconds left, rounded up. Always at least 1.
        remaining_secs: u64,
    },
}

impl CooldownStatus {
    /// Returns true for [`CooldownStatus::Ready`].
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    last_action_at: Instant,
    duration: Duration,
}

/// Cooldowns keyed by user and action name.
///
/// [`check_cooldown`](Self::check_cooldown) never mutates. The caller runs
/// the action and only then calls [`record_action`](Self::record_action),
/// so a failed action does not start a cooldown.
///
/// Each entry keeps the duration that applied when it was recorded.
#[derive(Debug)]
pub struct ActionCooldownManager<C = SystemClock> {
    default_duration: Duration,
    overrides: HashMap<String, Duration>,
    clock: C,
    entries: DashMap<(String, String), CooldownEntry>,
}

impl ActionCooldownManager<SystemClock> {
    /// Creates a manager on the system clock.
    #[must_use]
    pub fn new(default_duration: Duration) -> Self {
        Self::with_clock(default_duration, SystemClock)
    }
}

impl<C: Clock> ActionCooldownManager<C> {
    /// Creates a manager driven by `clock`.
    #[must_use]
    pub fn with_clock(default_duration: Duration, clock: C) -> Self {
        Self {
            default_duration,
            overrides: HashMap::new(),
            clock,
            entries: DashMap::new(),
        }
    }

    /// Uses `duration` instead of the default for `action`.
    #[must_use]
    pub fn with_override(mut self, action: impl Into<String>, duration: Duration) -> Self {
        self.overrides.insert(action.into(), duration);
        self
    }

    /// The cooldown that applies to `action`.
    #[must_use]
    pub fn duration_for(&self, action: &str) -> Duration {
        self.overrides
            .get(action)
            .copied()
            .unwrap_or(self.default_duration)
    }

    /// Checks whether `user_id` may perform `action` now. Read-only.
    #[must_use]
    pub fn check_cooldown(&self, user_id: &str, action: &str) -> CooldownStatus {
        let key = (user_id.to_string(), action.to_string());
        let Some(entry) = self.entries.get(&key).map(|e| *e.value()) else {
            return CooldownStatus::Ready;
        };

        let elapsed = self.clock.instant().saturating_duration_since(entry.last_action_at);
        if elapsed >= entry.duration {
            return CooldownStatus::Ready;
        }

        CooldownStatus::CoolingDown {
            remaining_secs: ceil_secs(entry.duration - elapsed),
        }
    }

    /// Records that `user_id` just performed `action`.
    pub fn record_action(&self, user_id: &str, action: &str) {
        let entry = CooldownEntry {
            last_action_at: self.clock.instant(),
            duration: self.duration_for(action),
        };
        self.entries
            .insert((user_id.to_string(), action.to_string()), entry);
    }

    /// Evicts entries idle for longer than both `retention` and their own
    /// duration. Returns the count.
    pub fn sweep(&self, now: Instant, retention: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            now.saturating_duration_since(entry.last_action_at) < retention.max(entry.duration)
        });
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked (user, action) pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rounds a non-zero duration up to whole seconds.
fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn manager() -> (ActionCooldownManager<ManualClock>, ManualClock) {
        let clock = ManualClock::at_secs(1_000);
        let manager = ActionCooldownManager::with_clock(Duration::from_secs(5), clock.clone())
            .with_override("export", Duration::from_secs(300));
        (manager, clock)
    }

    #[test]
    fn fresh_pair_is_ready() {
        let (manager, _clock) = manager();

        assert_eq!(manager.check_cooldown("u1", "refresh"), CooldownStatus::Ready);
    }

    #[test]
    fn check_does_not_record() {
        let (manager, _clock) = manager();

        manager.check_cooldown("u1", "refresh");
        manager.check_cooldown("u1", "refresh");

        assert!(manager.is_empty());
        assert!(manager.check_cooldown("u1", "refresh").is_allowed());
    }

    #[test]
    fn recorded_action_cools_down() {
        let (manager, clock) = manager();
        manager.record_action("u1", "refresh");

        assert_eq!(
            manager.check_cooldown("u1", "refresh"),
            CooldownStatus::CoolingDown { remaining_secs: 5 }
        );

        clock.advance(Duration::from_millis(4_200));
        assert_eq!(
            manager.check_cooldown("u1", "refresh"),
            CooldownStatus::CoolingDown { remaining_secs: 1 }
        );

        clock.advance(Duration::from_millis(800));
        assert!(manager.check_cooldown("u1", "refresh").is_allowed());
    }

    #[test]
    fn remaining_is_never_zero_while_cooling_down() {
        let (manager, clock) = manager();
        manager.record_action("u1", "refresh");

        clock.advance(Duration::from_millis(4_999));

        assert_eq!(
            manager.check_cooldown("u1", "refresh"),
            CooldownStatus::CoolingDown { remaining_secs: 1 }
        );
    }

    #[test]
    fn overrides_apply_per_action() {
        let (manager, clock) = manager();
        manager.record_action("u1", "export");
        manager.record_action("u1", "refresh");

        clock.advance(Duration::from_secs(10));

        assert!(manager.check_cooldown("u1", "refresh").is_allowed());
        assert_eq!(
            manager.check_cooldown("u1", "export"),
            CooldownStatus::CoolingDown { remaining_secs: 290 }
        );
        assert_eq!(manager.duration_for("export"), Duration::from_secs(300));
        assert_eq!(manager.duration_for("other"), Duration::from_secs(5));
    }

    #[test]
    fn actions_and_users_are_independent() {
        let (manager, _clock) = manager();
        manager.record_action("u1", "refresh");

        assert!(manager.check_cooldown("u1", "settings").is_allowed());
        assert!(manager.check_cooldown("u2", "refresh").is_allowed());
    }

    #[test]
    #[allow(arithmetic_overflow)]
    fn wall_clock_step_does_not_change_remaining_time() {
        let (manager, clock) = manager();
        manager.record_action("u1", "refresh");

        clock.set_secs(1_000 - 3_600);
        clock.advance(Duration::from_secs(2));

        assert_eq!(
            manager.check_cooldown("u1", "refresh"),
            CooldownStatus::CoolingDown { remaining_secs: 3 }
        );
    }

    #[test]
    fn sweep_keeps_entries_still_cooling_down() {
        let (manager, clock) = manager();
        manager.record_action("u1", "export");
        manager.record_action("u1", "refresh");

        clock.advance(Duration::from_secs(120));
        let evicted = manager.sweep(clock.instant(), Duration::from_secs(60));

        assert_eq!(evicted, 1);
        assert!(!manager.check_cooldown("u1", "export").is_allowed());
    }
}
