//! Abuse guards for user-triggered actions.
//!
//! - [`ActionRateLimiter`]: one short window per user across all actions
//! - [`ActionCooldownManager`]: longer per-action cooldowns, check then record
//! - [`StateConflictGuard`]: at most one active flow per user
//! - [`GuardContext`]: owns all of the above and their periodic sweep
//! - [`ActionGate`]: runs the guards in order and issues [`Permit`]s
//!
//! Lookups never fail: a missing entry is a first use.

mod conflict;
mod context;
mod cooldown;
mod gate;
mod rate_limit;

pub use conflict::{ConflictCheck, StateConflictGuard};
pub use context::{GuardContext, GuardSettings, SweepHandle, SweepReport};
pub use cooldown::{ActionCooldownManager, CooldownStatus};
pub use gate::{ActionGate, Denial, Permit};
pub use rate_limit::{ActionRateLimiter, RateDecision};
