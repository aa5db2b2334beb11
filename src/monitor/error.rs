//! Error types for the tracker.

use std::time::Duration;

use thiserror::Error;

use crate::address::AddressRejection;
use crate::state::StateError;

/// Error type for [`EndpointTracker`](super::EndpointTracker) operations.
///
/// Probe, notifier and per-cycle persistence failures are not errors at
/// this level; they are logged and reported through
/// [`CycleOutcome`](super::CycleOutcome).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No endpoint is registered for the user.
    #[error("No endpoint registered for user '{0}'")]
    UnknownUser(String),

    /// The submitted address failed validation.
    #[error("Address rejected ({code}): {0}", code = .0.reason())]
    InvalidAddress(#[from] AddressRejection),

    /// The store refused the write.
    #[error("Failed to persist endpoint state: {0}")]
    Persist(#[from] StateError),

    /// The store did not finish within the allotted time.
    #[error("Persisting endpoint state timed out after {}ms", .0.as_millis())]
    PersistTimeout(Duration),
}
