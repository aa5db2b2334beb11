//! At most one active interactive flow per user.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::time::{Clock, SystemClock};

/// Result of [`StateConflictGuard::check_conflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    /// No other flow is active.
    Clear,
    /// A different flow is active.
    Conflict {
        /// The flow that is currently active.
        current_flow: String,
    },
}

impl ConflictCheck {
    /// Returns true for [`ConflictCheck::Conflict`].
    #[must_use]
    pub const fn has_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[derive(Debug, Clone)]
struct ActiveFlow {
    name: String,
    since: Instant,
}

/// Tracks each user's active flow.
///
/// Setting a flow replaces whatever was active; flows never stack.
#[derive(Debug)]
pub struct StateConflictGuard<C = SystemClock> {
    clock: C,
    flows: DashMap<String, ActiveFlow>,
}

impl StateConflictGuard<SystemClock> {
    /// Creates a guard on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for StateConflictGuard<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> StateConflictGuard<C> {
    /// Creates a guard driven by `clock`.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            flows: DashMap::new(),
        }
    }

    /// Checks whether starting or continuing `flow` clashes with another.
    #[must_use]
    pub fn check_conflict(&self, user_id: &str, flow: &str) -> ConflictCheck {
        match self.flows.get(user_id) {
            Some(active) if active.name != flow => ConflictCheck::Conflict {
                current_flow: active.name.clone(),
            },
            _ => ConflictCheck::Clear,
        }
    }

    /// Makes `flow` the user's active flow, replacing any other.
    pub fn set_active_flow(&self, user_id: &str, flow: &str) {
        let active = ActiveFlow {
            name: flow.to_string(),
            since: self.clock.instant(),
        };
        if let Some(previous) = self.flows.insert(user_id.to_string(), active) {
            if previous.name != flow {
                tracing::debug!("{user_id} left '{}' for '{flow}'", previous.name);
            }
        }
    }

    /// Ends the user's active flow, returning its name.
    pub fn clear_active_flow(&self, user_id: &str) -> Option<String> {
        self.flows.remove(user_id).map(|(_, flow)| flow.name)
    }

    /// Returns the user's active flow.
    #[must_use]
    pub fn active_flow(&self, user_id: &str) -> Option<String> {
        self.flows.get(user_id).map(|flow| flow.name.clone())
    }

    /// Evicts flows set longer than `retention` ago. Returns the count.
    pub fn sweep(&self, now: Instant, retention: Duration) -> usize {
        let before = self.flows.len();
        self.flows
            .retain(|_, flow| now.saturating_duration_since(flow.since) < retention);
        before.saturating_sub(self.flows.len())
    }

    /// Number of users with an active flow.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    /// Returns true if no flow is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
