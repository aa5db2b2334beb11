//! Notification payload.

use std::time::SystemTime;

use serde::Serialize;

use crate::monitor::Reachability;
use crate::time::to_unix_millis;

/// A confirmed reachability change to report to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Recipient.
    pub user_id: String,
    /// The monitored address.
    pub address: String,
    /// The confirmed state.
    pub state: Reachability,
    /// The state the user was previously told about, if any.
    pub previous: Option<Reachability>,
    /// When the new state was first observed.
    pub changed_at: SystemTime,
}

impl Notification {
    /// Renders the human-readable message text.
    #[must_use]
    pub fn message(&self) -> String {
        match (self.state, self.previous) {
            (Reachability::Up, Some(Reachability::Down)) => {
                format!("✅ {} is reachable again", self.address)
            }
            (Reachability::Up, _) => format!("✅ {} is reachable", self.address),
            (Reachability::Down, Some(Reachability::Up)) => {
                format!("❌ {} went down", self.address)
            }
            (Reachability::Down, _) => format!("❌ {} is unreachable", self.address),
        }
    }

    /// Returns the serializable view sent over the wire.
    #[must_use]
    pub fn payload(&self) -> NotificationPayload<'_> {
        NotificationPayload {
            user_id: &self.user_id,
            address: &self.address,
            state: self.state,
            previous: self.previous,
            changed_at: to_unix_millis(self.changed_at),
            message: self.message(),
        }
    }
}

/// Wire format of a [`Notification`].
///
/// Also the data model for body templates: `{{user_id}}`, `{{address}}`,
/// `{{state}}`, `{{previous}}`, `{{changed_at}}` (Unix ms) and `{{message}}`.
#[derive(Debug, Serialize)]
pub struct NotificationPayload<'a> {
    /// Recipient.
    pub user_id: &'a str,
    /// The monitored address.
    pub address: &'a str,
    /// The confirmed state.
    pub state: Reachability,
    /// The previously notified state.
    pub previous: Option<Reachability>,
    /// Milliseconds since the Unix epoch.
    pub changed_at: u64,
    /// Rendered message text.
    pub message: String,
}
