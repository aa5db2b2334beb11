//! Per-user endpoint state machine.
//!
//! A [`MonitoredEndpoint`] folds successive probe results into a
//! [`TrackerState`]. New readings first enter [`TrackerState::Pending`] and
//! only become [`TrackerState::Confirmed`] after holding for the whole
//! stabilization window. Notification bookkeeping lives on the same entry
//! so it survives restarts together with the state it describes.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use super::StabilizationPolicy;
use crate::state::EndpointRecord;
use crate::time::{elapsed_since, from_unix_millis, to_unix_millis};

/// A probe reading: the endpoint either answered or it did not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    /// The endpoint is reachable.
    Up,
    /// The endpoint did not answer.
    Down,
}

impl Reachability {
    /// Lowercase name used in payloads and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracker state for one endpoint.
///
/// `since` is always the moment the current reading was first observed,
/// i.e. the last transition time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No probe has succeeded yet.
    Unknown,
    /// A new reading was observed but has not held for the full window.
    Pending {
        /// The reading being stabilized.
        reachability: Reachability,
        /// When the reading was first observed.
        since: SystemTime,
    },
    /// The reading held for the full window.
    Confirmed {
        /// The confirmed reading.
        reachability: Reachability,
        /// When the reading was first observed.
        since: SystemTime,
    },
}

impl TrackerState {
    /// Returns the most recent reading, confirmed or not.
    #[must_use]
    pub const fn last_known(&self) -> Option<Reachability> {
        match self {
            Self::Unknown => None,
            Self::Pending { reachability, .. } | Self::Confirmed { reachability, .. } => {
                Some(*reachability)
            }
        }
    }

    /// Returns when the current reading was first observed.
    #[must_use]
    pub const fn transition_at(&self) -> Option<SystemTime> {
        match self {
            Self::Unknown => None,
            Self::Pending { since, .. } | Self::Confirmed { since, .. } => Some(*since),
        }
    }

    /// Returns true while a transition is waiting out its window.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

/// What a single probe reading did to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The reading differs from the last known one; the window restarted.
    Transitioned {
        /// Previous reading, `None` when the state was unknown.
        from: Option<Reachability>,
        /// The new reading.
        to: Reachability,
    },
    /// Same reading as before, still inside the window.
    Stabilizing {
        /// Time left until the reading counts as stable.
        remaining: Duration,
    },
    /// The window elapsed on this reading; the entry is now confirmed.
    Stabilized(Reachability),
    /// Already confirmed, nothing changed.
    Steady,
}

impl Observation {
    /// Returns true if the observation changed the entry.
    #[must_use]
    pub const fn mutated(&self) -> bool {
        matches!(self, Self::Transitioned { .. } | Self::Stabilized(_))
    }
}

/// An endpoint being monitored on behalf of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredEndpoint {
    address: String,
    debounce_minutes: u32,
    state: TrackerState,
    last_stable_at: Option<SystemTime>,
    last_notification_at: Option<SystemTime>,
    notified: Option<Reachability>,
}

impl MonitoredEndpoint {
    /// Creates an endpoint in the [`TrackerState::Unknown`] state.
    ///
    /// The address is assumed to have passed [`crate::address::validate`].
    #[must_use]
    pub fn new(address: impl Into<String>, debounce_minutes: u32) -> Self {
        Self {
            address: address.into(),
            debounce_minutes,
            state: TrackerState::Unknown,
            last_stable_at: None,
            last_notification_at: None,
            notified: None,
        }
    }

    /// Returns the monitored address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the per-user debounce setting (0 = minimum stabilization).
    #[must_use]
    pub const fn debounce_minutes(&self) -> u32 {
        self.debounce_minutes
    }

    /// Changes the debounce setting. Takes effect on the next reading.
    pub const fn set_debounce_minutes(&mut self, minutes: u32) {
        self.debounce_minutes = minutes;
    }

    /// Returns the current tracker state.
    #[must_use]
    pub const fn state(&self) -> TrackerState {
        self.state
    }

    /// Returns when the entry last became stable.
    #[must_use]
    pub const fn last_stable_at(&self) -> Option<SystemTime> {
        self.last_stable_at
    }

    /// Returns when the last notification was successfully dispatched.
    #[must_use]
    pub const fn last_notification_at(&self) -> Option<SystemTime> {
        self.last_notification_at
    }

    /// Returns the state the user was last told about.
    #[must_use]
    pub const fn notified(&self) -> Option<Reachability> {
        self.notified
    }

    /// Points the entry at a different address.
    ///
    /// Tracking restarts from [`TrackerState::Unknown`], but the
    /// notification clock is kept so the cooldown still applies.
    pub fn readdress(&mut self, address: impl Into<String>) {
        self.address = address.into();
        self.state = TrackerState::Unknown;
        self.last_stable_at = None;
        self.notified = None;
    }

    /// Folds one successful probe reading into the state machine.
    ///
    /// | State | Reading | Result |
    /// |-------|---------|--------|
    /// | Unknown | any | `Pending`, window starts |
    /// | Pending/Confirmed(x) | y ≠ x | `Pending(y)`, window restarts |
    /// | Pending(x) | x, window not elapsed | unchanged |
    /// | Pending(x) | x, window elapsed | `Confirmed(x)`, `last_stable_at = now` |
    /// | Confirmed(x) | x | unchanged |
    pub fn observe(
        &mut self,
        reading: Reachability,
        now: SystemTime,
        policy: &StabilizationPolicy,
    ) -> Observation {
        match self.state {
            TrackerState::Pending { reachability, since }
                if reachability == reading =>
            {
                let window = policy.window_for(self.debounce_minutes);
                let elapsed = elapsed_since(now, since);
                if elapsed >= window {
                    self.state = TrackerState::Confirmed {
                        reachability,
                        since,
                    };
                    self.last_stable_at = Some(now);
                    Observation::Stabilized(reachability)
                } else {
                    Observation::Stabilizing {
                        remaining: window - elapsed,
                    }
                }
            }
            TrackerState::Confirmed { reachability, .. } if reachability == reading => {
                Observation::Steady
            }
            state => {
                self.state = TrackerState::Pending {
                    reachability: reading,
                    since: now,
                };
                Observation::Transitioned {
                    from: state.last_known(),
                    to: reading,
                }
            }
        }
    }

    /// Returns the confirmed state if the user has not been told about it yet.
    ///
    /// A flap that settles back on the already-notified state owes nothing.
    #[must_use]
    pub fn owed_notification(&self) -> Option<Reachability> {
        match self.state {
            TrackerState::Confirmed { reachability, .. }
                if self.notified != Some(reachability) =>
            {
                Some(reachability)
            }
            _ => None,
        }
    }

    /// Records a successfully dispatched notification.
    ///
    /// `last_notification_at` never moves backwards, even if `at` does.
    pub fn record_notification(&mut self, reachability: Reachability, at: SystemTime) {
        self.notified = Some(reachability);
        self.last_notification_at = Some(self.last_notification_at.map_or(at, |prev| prev.max(at)));
    }
}

impl From<&MonitoredEndpoint> for EndpointRecord {
    fn from(endpoint: &MonitoredEndpoint) -> Self {
        Self {
            address: endpoint.address.clone(),
            last_known_state: endpoint.state.last_known(),
            last_transition_at: endpoint.state.transition_at().map(to_unix_millis),
            last_stable_at: endpoint.last_stable_at.map(to_unix_millis),
            last_notification_at: endpoint.last_notification_at.map(to_unix_millis),
            notified_state: endpoint.notified,
            debounce_minutes: endpoint.debounce_minutes,
        }
    }
}

impl From<EndpointRecord> for MonitoredEndpoint {
    /// Rebuilds the tagged state from the flat persisted fields.
    ///
    /// The entry is pending exactly when its transition is newer than its
    /// last stable point. A known state without a transition time cannot be
    /// placed in time and restarts as unknown.
    fn from(record: EndpointRecord) -> Self {
        let last_stable_at = record.last_stable_at.map(from_unix_millis);
        let state = match (record.last_known_state, record.last_transition_at) {
            (Some(reachability), Some(at)) => {
                let since = from_unix_millis(at);
                if last_stable_at.is_some_and(|stable| stable >= since) {
                    TrackerState::Confirmed {
                        reachability,
                        since,
                    }
                } else {
                    TrackerState::Pending {
                        reachability,
                        since,
                    }
                }
            }
            _ => TrackerState::Unknown,
        };

        Self {
            address: record.address,
            debounce_minutes: record.debounce_minutes,
            state,
            last_stable_at,
            last_notification_at: record.last_notification_at.map(from_unix_millis),
            notified: record.notified_state,
        }
    }
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
