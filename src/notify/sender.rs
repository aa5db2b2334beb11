//! Notifier trait and its HTTP and log-only implementations.

use std::time::Duration;

use handlebars::Handlebars;

use super::{AttemptError, HttpClient, HttpError, HttpRequest, Notification, NotifyError, RetryPolicy};
use crate::time::{Sleeper, TokioSleeper};

#[cfg(test)]
#[path = "sender_tests.rs"]
mod tests;

/// Delivers [`Notification`]s to users.
///
/// `Ok` means the user was told. Any error means they were not, and the
/// caller should try again on a later cycle.
pub trait Notifier: Send + Sync {
    /// Delivers one notification, retrying internally where sensible.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when delivery failed.
    fn send(
        &self,
        notification: &Notification,
    ) -> impl std::future::Future<Output = Result<(), NotifyError>> + Send;
}

/// Webhook notifier with exponential backoff.
///
/// Without a body template the request carries the JSON form of
/// [`NotificationPayload`](super::NotificationPayload) and a
/// `Content-Type: application/json` header unless one was configured. With a
/// template the body is the Handlebars rendering of the same payload.
#[derive(Debug)]
pub struct HttpNotifier<H, S = TokioSleeper> {
    client: H,
    sleeper: S,
    url: url::Url,
    method: http::Method,
    headers: http::HeaderMap,
    body_template: Option<String>,
    request_timeout: Option<Duration>,
    retry_policy: RetryPolicy,
}

impl<H> HttpNotifier<H, TokioSleeper> {
    /// Creates a POST notifier with the default retry policy.
    #[must_use]
    pub fn new(client: H, url: url::Url) -> Self {
        Self {
            client,
            sleeper: TokioSleeper,
            url,
            method: http::Method::POST,
            headers: http::HeaderMap::new(),
            body_template: None,
            request_timeout: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl<H, S> HttpNotifier<H, S> {
    /// Replaces the sleeper used between retries.
    #[must_use]
    pub fn with_sleeper<S2>(self, sleeper: S2) -> HttpNotifier<H, S2> {
        HttpNotifier {
            client: self.client,
            sleeper,
            url: self.url,
            method: self.method,
            headers: self.headers,
            body_template: self.body_template,
            request_timeout: self.request_timeout,
            retry_policy: self.retry_policy,
        }
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: http::Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: http::HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a Handlebars body template.
    #[must_use]
    pub fn with_body_template(mut self, template: impl Into<String>) -> Self {
        self.body_template = Some(template.into());
        self
    }

    /// Sets the timeout for each individual attempt.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Returns the target URL.
    #[must_use]
    pub const fn url(&self) -> &url::Url {
        &self.url
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &http::Method {
        &self.method
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    fn render_body(&self, notification: &Notification) -> Result<Vec<u8>, AttemptError> {
        let payload = notification.payload();
        match &self.body_template {
            Some(template) => Handlebars::new()
                .render_template(template, &payload)
                .map(String::into_bytes)
                .map_err(|e| AttemptError::Template(e.to_string())),
            None => serde_json::to_vec(&payload).map_err(AttemptError::Serialize),
        }
    }

    fn build_request(&self, notification: &Notification) -> Result<HttpRequest, AttemptError> {
        let mut request = HttpRequest::new(self.method.clone(), self.url.clone())
            .with_body(self.render_body(notification)?);
        request.headers = self.headers.clone();

        if self.body_template.is_none() && !request.headers.contains_key(http::header::CONTENT_TYPE) {
            request.headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static("application/json"),
            );
        }
        if let Some(timeout) = self.request_timeout {
            request = request.with_timeout(timeout);
        }

        Ok(request)
    }
}

impl<H: HttpClient, S: Sleeper> HttpNotifier<H, S> {
    async fn attempt(&self, request: &HttpRequest) -> Result<(), AttemptError> {
        let response = self.client.request(request.clone()).await?;

        if response.is_success() {
            return Ok(());
        }

        Err(AttemptError::NonSuccessStatus {
            status: response.status,
            body: response.body_text().map(ToString::to_string),
        })
    }
}

impl<H: HttpClient, S: Sleeper> Notifier for HttpNotifier<H, S> {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let request = self
            .build_request(notification)
            .map_err(NotifyError::Rejected)?;

        let mut attempt = 1;
        loop {
            let error = match self.attempt(&request).await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_retryable() => return Err(NotifyError::Rejected(e)),
                Err(e) => e,
            };

            if !self.retry_policy.should_retry(attempt) {
                return Err(NotifyError::MaxRetriesExceeded {
                    attempts: attempt,
                    last_error: error,
                });
            }

            tracing::debug!(
                "Notification for {} failed (attempt {attempt}): {error}",
                notification.user_id
            );
            self.sleeper
                .sleep(self.retry_policy.delay_for_retry(attempt - 1))
                .await;
            attempt += 1;
        }
    }
}

/// Notifier that only logs, used for `--dry-run`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            user_id = %notification.user_id,
            state = %notification.state,
            "[dry-run] {}",
            notification.message()
        );
        Ok(())
    }
}

/// Classifies failures as transient or permanent.
pub trait IsRetryable {
    /// Returns true if trying again could succeed.
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for HttpError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout => true,
            Self::InvalidRequest(_) => false,
        }
    }
}

impl IsRetryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_retryable(),
            Self::NonSuccessStatus { status, .. } => {
                status.is_server_error()
                    || *status == http::StatusCode::TOO_MANY_REQUESTS
                    || *status == http::StatusCode::REQUEST_TIMEOUT
            }
            Self::Template(_) | Self::Serialize(_) => false,
        }
    }
}
