//! Error types for notification delivery.

use std::time::Duration;

use thiserror::Error;

/// Error type for HTTP transport operations.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Network connection failed (DNS, refused, reset, TLS).
    #[error("Connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The server did not respond in time.
    #[error("Request timed out")]
    Timeout,

    /// The request could not be built, usually a configuration problem.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A single failed delivery attempt.
///
/// Whether it is worth retrying is decided by
/// [`IsRetryable`](super::IsRetryable).
#[derive(Debug, Error)]
pub enum AttemptError {
    /// Transport-level failure.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}{}", .body.as_deref().map(|b| format!(": {b}")).unwrap_or_default())]
    NonSuccessStatus {
        /// Response status
        status: http::StatusCode,
        /// Response body, when it was valid UTF-8
        body: Option<String>,
    },

    /// The body template failed to render.
    #[error("Template rendering failed: {0}")]
    Template(String),

    /// The default JSON body failed to serialize.
    #[error("Payload serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Error returned by a [`Notifier`](super::Notifier).
///
/// Any variant means the notification was not delivered.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// A failure that retrying can not fix.
    #[error("Notification rejected: {0}")]
    Rejected(#[source] AttemptError),

    /// Every attempt failed with a retryable error.
    #[error("Notification failed after {attempts} attempt(s): {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made
        attempts: u32,
        /// Error from the final attempt
        #[source]
        last_error: AttemptError,
    },

    /// The whole dispatch exceeded its time budget.
    #[error("Notification timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}
