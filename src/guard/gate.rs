//! Single entry point that runs every guard in order.

use std::sync::Arc;

use thiserror::Error;

use super::{ConflictCheck, CooldownStatus, GuardContext, RateDecision};
use crate::time::{Clock, SystemClock};

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    /// Too soon after the user's previous action of any kind.
    #[error("Too many requests, slow down")]
    RateLimited,

    /// This action is still cooling down.
    #[error("Please wait {remaining_secs}s before trying again")]
    CoolingDown {
        /// Whole seconds left, at least 1.
        remaining_secs: u64,
    },

    /// Another flow is in progress.
    #[error("Finish '{current_flow}' first")]
    Conflict {
        /// The flow that blocks this one.
        current_flow: String,
    },
}

impl Denial {
    /// Stable reason code.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::RateLimited => "cooldown",
            Self::CoolingDown { .. } => "action_cooldown",
            Self::Conflict { .. } => "flow_conflict",
        }
    }
}

/// Proof that an action passed the gate.
///
/// Hand it back to [`ActionGate::complete`] once the action succeeded.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an unused permit never starts the action's cooldown"]
pub struct Permit {
    user_id: String,
    action: String,
}

impl Permit {
    /// The user the permit was issued to.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The permitted action.
    #[must_use]
    pub fn action(&self) -> &str {
        &self.action
    }
}

/// Runs the rate limiter, then the cooldown, then the conflict guard.
///
/// The rate limiter records on every pass, so a tap that is later refused
/// by the cooldown or conflict guard still counts as a tap.
#[derive(Debug, Clone)]
pub struct ActionGate<C = SystemClock> {
    context: Arc<GuardContext<C>>,
}

impl<C: Clock> ActionGate<C> {
    /// Creates a gate over a shared context.
    #[must_use]
    pub const fn new(context: Arc<GuardContext<C>>) -> Self {
        Self { context }
    }

    /// Returns the underlying context.
    #[must_use]
    pub const fn context(&self) -> &Arc<GuardContext<C>> {
        &self.context
    }

    /// Decides whether `user_id` may perform `action` now.
    ///
    /// `flow` names the interactive flow the action belongs to, if any.
    ///
    /// # Errors
    ///
    /// Returns the first [`Denial`] encountered.
    pub fn check(&self, user_id: &str, action: &str, flow: Option<&str>) -> Result<Permit, Denial> {
        if let RateDecision::Limited = self.context.rate_limiter().check_action(user_id, action) {
            return Err(Denial::RateLimited);
        }

        if let CooldownStatus::CoolingDown { remaining_secs } =
            self.context.cooldowns().check_cooldown(user_id, action)
        {
            return Err(Denial::CoolingDown { remaining_secs });
        }

        if let Some(flow) = flow {
            if let ConflictCheck::Conflict { current_flow } =
                self.context.conflicts().check_conflict(user_id, flow)
            {
                return Err(Denial::Conflict { current_flow });
            }
        }

        Ok(Permit {
            user_id: user_id.to_string(),
            action: action.to_string(),
        })
    }

    /// Records a permitted action as performed, starting its cooldown.
    pub fn complete(&self, permit: Permit) {
        self.context
            .cooldowns()
            .record_action(&permit.user_id, &permit.action);
    }
}
