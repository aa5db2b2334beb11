//! Tests for `HttpNotifier` and `LogNotifier`.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::monitor::Reachability;
use crate::notify::HttpResponse;
use crate::time::{InstantSleeper, from_unix_millis};

/// HTTP client that replays a script of responses.
#[derive(Debug)]
struct ScriptedClient {
    responses: Mutex<Vec<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn ok() -> Self {
        Self::new(vec![Ok(HttpResponse::status(http::StatusCode::OK))])
    }

    fn statuses(codes: &[u16]) -> Self {
        Self::new(
            codes
                .iter()
                .map(|c| Ok(HttpResponse::status(http::StatusCode::from_u16(*c).unwrap())))
                .collect(),
        )
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> HttpRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

impl HttpClient for ScriptedClient {
    async fn request(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req);
        self.responses.lock().unwrap().remove(0)
    }
}

fn hook_url() -> url::Url {
    url::Url::parse("https://hooks.example.com/reach").unwrap()
}

fn notification() -> Notification {
    Notification {
        user_id: "alice".to_string(),
        address: "example.com".to_string(),
        state: Reachability::Down,
        previous: Some(Reachability::Up),
        changed_at: from_unix_millis(1_700_000_000_000),
    }
}

fn notifier(client: ScriptedClient) -> HttpNotifier<ScriptedClient, InstantSleeper> {
    HttpNotifier::new(client, hook_url()).with_sleeper(InstantSleeper)
}

mod request_shape {
    use super::*;

    #[tokio::test]
    async fn default_body_is_json_payload() {
        let sender = notifier(ScriptedClient::ok());

        sender.send(&notification()).await.unwrap();

        let request = sender.client.last_request();
        assert_eq!(request.method, http::Method::POST);
        assert_eq!(request.url, hook_url());
        assert_eq!(request.headers[http::header::CONTENT_TYPE], "application/json");

        let body: serde_json::Value = serde_json::from_slice(&request.body.unwrap()).unwrap();
        assert_eq!(body["user_id"], "alice");
        assert_eq!(body["address"], "example.com");
        assert_eq!(body["state"], "down");
        assert_eq!(body["previous"], "up");
        assert_eq!(body["changed_at"], 1_700_000_000_000_u64);
        assert_eq!(body["message"], "❌ example.com went down");
    }

    #[tokio::test]
    async fn configured_content_type_is_kept() {
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/vnd.custom+json"),
        );
        let sender = notifier(ScriptedClient::ok()).with_headers(headers);

        sender.send(&notification()).await.unwrap();

        let request = sender.client.last_request();
        assert_eq!(
            request.headers[http::header::CONTENT_TYPE],
            "application/vnd.custom+json"
        );
    }

    #[tokio::test]
    async fn template_renders_payload_fields() {
        let sender = notifier(ScriptedClient::ok())
            .with_method(http::Method::PUT)
            .with_body_template("{{user_id}}|{{address}}|{{state}}|{{previous}}");

        sender.send(&notification()).await.unwrap();

        let request = sender.client.last_request();
        assert_eq!(request.method, http::Method::PUT);
        assert_eq!(request.body.unwrap(), b"alice|example.com|down|up");
        assert!(!request.headers.contains_key(http::header::CONTENT_TYPE));
    }

    #[tokio::test]
    async fn request_timeout_is_forwarded() {
        let sender = notifier(ScriptedClient::ok())
            .with_request_timeout(std::time::Duration::from_secs(4));

        sender.send(&notification()).await.unwrap();

        assert_eq!(
            sender.client.last_request().timeout,
            Some(std::time::Duration::from_secs(4))
        );
    }

    #[tokio::test]
    async fn broken_template_is_rejected_without_sending() {
        let sender = notifier(ScriptedClient::ok()).with_body_template("{{#if}}");

        let result = sender.send(&notification()).await;

        assert!(matches!(
            result,
            Err(NotifyError::Rejected(AttemptError::Template(_)))
        ));
        assert_eq!(sender.client.calls(), 0);
    }
}

mod retries {
    use super::*;

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let sender = notifier(ScriptedClient::new(vec![
            Err(HttpError::Timeout),
            Ok(HttpResponse::status(http::StatusCode::BAD_GATEWAY)),
            Ok(HttpResponse::status(http::StatusCode::OK)),
        ]));

        sender.send(&notification()).await.unwrap();

        assert_eq!(sender.client.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let sender = notifier(ScriptedClient::statuses(&[500, 500, 500, 500]))
            .with_retry_policy(RetryPolicy::new().with_max_attempts(2));

        let result = sender.send(&notification()).await;

        match result {
            Err(NotifyError::MaxRetriesExceeded {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(
                    last_error,
                    AttemptError::NonSuccessStatus { status, .. } if status == http::StatusCode::INTERNAL_SERVER_ERROR
                ));
            }
            other => panic!("Expected MaxRetriesExceeded, got {other:?}"),
        }
        assert_eq!(sender.client.calls(), 2);
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let sender = notifier(ScriptedClient::statuses(&[404, 200]));

        let result = sender.send(&notification()).await;

        assert!(matches!(result, Err(NotifyError::Rejected(_))));
        assert_eq!(sender.client.calls(), 1);
    }

    #[tokio::test]
    async fn rate_limit_and_request_timeout_are_retried() {
        let sender = notifier(ScriptedClient::statuses(&[429, 408, 204]));

        sender.send(&notification()).await.unwrap();

        assert_eq!(sender.client.calls(), 3);
    }
}

mod classification {
    use super::*;

    fn status(code: u16) -> AttemptError {
        AttemptError::NonSuccessStatus {
            status: http::StatusCode::from_u16(code).unwrap(),
            body: None,
        }
    }

    #[test]
    fn transport_errors() {
        assert!(HttpError::Timeout.is_retryable());
        assert!(HttpError::Connection("reset".into()).is_retryable());
        assert!(!HttpError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn statuses() {
        for code in [500, 502, 503, 504, 408, 429] {
            assert!(status(code).is_retryable(), "{code} should retry");
        }
        for code in [400, 401, 403, 404, 422] {
            assert!(!status(code).is_retryable(), "{code} should not retry");
        }
    }

    #[test]
    fn configuration_errors_are_permanent() {
        assert!(!AttemptError::Template("x".into()).is_retryable());
    }

    #[test]
    fn status_error_display_includes_body() {
        let error = AttemptError::NonSuccessStatus {
            status: http::StatusCode::BAD_REQUEST,
            body: Some("missing field".into()),
        };
        assert_eq!(error.to_string(), "HTTP 400 Bad Request: missing field");
        assert_eq!(status(503).to_string(), "HTTP 503 Service Unavailable");
    }
}

mod dry_run {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.send(&notification()).await.is_ok());
    }
}
