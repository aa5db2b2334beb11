//! Notification delivery.
//!
//! - [`Notification`]: what a user is told about a confirmed change
//! - [`Notifier`]: delivery abstraction used by the tracker
//! - [`HttpNotifier`]: webhook delivery with [`RetryPolicy`] backoff
//! - [`LogNotifier`]: log-only delivery for dry runs
//! - [`HttpClient`] / [`ReqwestClient`]: transport seam

mod client;
mod error;
mod notification;
mod request;
mod retry;
mod sender;


pub use client::ReqwestClient;
pub use error::{AttemptError, HttpError, NotifyError};
pub use request::{HttpClient, HttpRequest, HttpResponse};
pub use notification::{Notification, NotificationPayload};
pub use retry::RetryPolicy;
pub use sender::{HttpNotifier, IsRetryable, LogNotifier, Notifier};
