//! Endpoint state persistence across restarts.
//!
//! The tracker's in-memory state is authoritative; the store only exists so
//! that stabilization and cooldown clocks survive a process restart.

mod file;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

pub use file::FileEndpointStore;

use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitor::Reachability;

/// Persisted form of one monitored endpoint.
///
/// Timestamps are milliseconds since the Unix epoch. The entry is pending
/// exactly when `last_transition_at > last_stable_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    /// The monitored address.
    pub address: String,

    /// Last probe reading; `None` means unknown.
    #[serde(default)]
    pub last_known_state: Option<Reachability>,

    /// When the last reading was first observed.
    #[serde(default)]
    pub last_transition_at: Option<u64>,

    /// When the entry last completed its stabilization window.
    #[serde(default)]
    pub last_stable_at: Option<u64>,

    /// When the last notification was successfully dispatched.
    #[serde(default)]
    pub last_notification_at: Option<u64>,

    /// The state the user was last told about.
    #[serde(default)]
    pub notified_state: Option<Reachability>,

    /// Per-user debounce setting in minutes.
    #[serde(default)]
    pub debounce_minutes: u32,
}

/// All persisted endpoints, keyed by user id.
pub type EndpointRecords = BTreeMap<String, EndpointRecord>;

/// Result of loading state from persistent storage.
///
/// Explicitly models all valid states to avoid ambiguity:
/// - Successfully loaded previous state
/// - No previous state exists (first run)
/// - State exists but is corrupted/unreadable
#[derive(Debug, Clone)]
pub enum LoadResult {
    /// Successfully loaded previously saved endpoints.
    Loaded(EndpointRecords),

    /// No state file exists (first run or explicitly deleted).
    NotFound,

    /// State file exists but could not be parsed.
    /// Program should continue with fresh state and overwrite on next save.
    Corrupted {
        /// Reason for corruption (for logging/debugging).
        reason: String,
    },
}

impl LoadResult {
    /// Returns the loaded records, or an empty map for `NotFound`/`Corrupted`.
    #[must_use]
    pub fn into_records(self) -> EndpointRecords {
        match self {
            Self::Loaded(records) => records,
            Self::NotFound | Self::Corrupted { .. } => EndpointRecords::new(),
        }
    }

    /// Returns `true` if state was successfully loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }
}

/// Errors that can occur during state persistence operations.
///
/// Only covers write-side errors; read-side issues are modeled
/// as [`LoadResult`] variants to allow graceful degradation.
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to write the state file.
    #[error("Failed to write state file: {0}")]
    Write(#[source] io::Error),

    /// Failed to serialize state to JSON.
    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The blocking write task did not complete.
    #[error("State write task failed: {0}")]
    Task(#[source] tokio::task::JoinError),
}

/// Durable storage for monitored endpoints.
///
/// Implementations should:
/// - Use atomic writes to prevent corruption from crashes
/// - Handle missing files gracefully (return `LoadResult::NotFound`)
/// - Degrade gracefully on read errors (return `LoadResult::Corrupted`)
pub trait EndpointStore: Send + Sync {
    /// Loads every persisted endpoint.
    fn load(&self) -> LoadResult;

    /// Loads a single user's endpoint, if one was persisted.
    fn load_endpoint(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Option<EndpointRecord>> + Send {
        let record = match self.load() {
            LoadResult::Loaded(mut records) => records.remove(user_id),
            LoadResult::NotFound | LoadResult::Corrupted { .. } => None,
        };
        std::future::ready(record)
    }

    /// Persists one user's endpoint, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn save(
        &self,
        user_id: &str,
        record: &EndpointRecord,
    ) -> impl std::future::Future<Output = Result<(), StateError>> + Send;

    /// Removes one user's endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn remove(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<(), StateError>> + Send;

    /// Replaces the whole persisted set in one write.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be written.
    fn save_all(
        &self,
        records: &EndpointRecords,
    ) -> impl std::future::Future<Output = Result<(), StateError>> + Send;
}
