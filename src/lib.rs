//! reachguard: debounced reachability notifications and action guards
//!
//! A library for probing user-registered addresses, confirming state
//! changes only after they stabilize, and notifying users through a
//! webhook without flooding them. Also provides per-user rate limits,
//! cooldowns and flow conflict guards for user-triggered actions.

pub mod address;
pub mod config;
pub mod guard;
pub mod monitor;
pub mod notify;
pub mod state;
pub mod time;
