//! Request pipeline: one logical call, at most one automatic recovery on an
//! auth-invalid reply.

use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::client::EskizError;
use crate::client::http::HttpTransport;
use crate::client::token::TokenManager;
use crate::transport::{
    RawResponse, RequestBody, body_message, body_status, decode_response, encode_body, is_success,
    normalize_payload,
};

pub(crate) struct RequestPipeline {
    http: Arc<dyn HttpTransport>,
    token: Arc<TokenManager>,
    base_url: String,
}

impl RequestPipeline {
    pub(crate) fn new(
        http: Arc<dyn HttpTransport>,
        token: Arc<TokenManager>,
        base_url: String,
    ) -> Self {
        Self {
            http,
            token,
            base_url,
        }
    }

    /// Execute one authenticated call and return the parsed body.
    ///
    /// The payload is normalized first (`from_whom` → `from`, phone
    /// formatting stripped, nulls dropped). On a 401 that reports the token
    /// itself invalid, the token is refreshed (or re-acquired via login when
    /// refresh says it is unrecoverable) and the request is retried exactly
    /// once. A second auth-invalid reply is terminal: the call fails with
    /// [`EskizError::TokenBlackListed`] and no further retry happens.
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        payload: Value,
    ) -> Result<Value, EskizError> {
        let payload = normalize_payload(payload);
        let body = encode_body(&payload);
        let url = format!("{}{}", self.base_url, path);

        let token = self.token.current_token().await?;
        let mut response = self.dispatch(&method, &url, &body, &token).await?;

        if response.token_invalid {
            if !self.token.auto_update() {
                return Err(blacklisted(&response));
            }
            let fresh = match self.token.refresh().await {
                Ok(token) => token,
                // Refresh says the token is beyond saving; a fresh login is
                // the one remaining recovery path.
                Err(EskizError::Authentication { .. }) => self.token.login().await?,
                Err(err) => return Err(err),
            };
            response = self.dispatch(&method, &url, &body, &fresh).await?;
            if response.token_invalid {
                return Err(blacklisted(&response));
            }
        }

        if !is_success(response.status_code) {
            return Err(classify_failure(&response));
        }

        self.token.mark_checked().await;
        Ok(response.body)
    }

    #[cfg(test)]
    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        body: &RequestBody,
        token: &str,
    ) -> Result<RawResponse, EskizError> {
        let headers = vec![("Authorization".to_owned(), format!("Bearer {token}"))];
        let response = self
            .http
            .send(method.clone(), url, body.clone(), headers)
            .await
            .map_err(EskizError::Transport)?;
        debug!(status_code = response.status, body = %response.body, "gateway response");
        decode_response(response.status, &response.body)
            .map_err(|err| EskizError::Decode(Box::new(err)))
    }
}

fn blacklisted(response: &RawResponse) -> EskizError {
    EskizError::TokenBlackListed {
        status: body_status(&response.body),
        message: body_message(&response.body, response.status_code),
    }
}

fn classify_failure(response: &RawResponse) -> EskizError {
    let message = body_message(&response.body, response.status_code);
    match response.status_code {
        400 | 401 => EskizError::BadRequest {
            status_code: response.status_code,
            status: body_status(&response.body),
            message,
        },
        _ => EskizError::Service {
            status_code: response.status_code,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use crate::client::http::test_support::FakeTransport;
    use crate::client::token::{Credentials, DEFAULT_REFRESH_COOLDOWN};
    use crate::domain::{Email, Password};

    use super::*;

    const LOGIN_OK: &str = r#"{"message":"token_generated","data":{"token":"tok-live"}}"#;
    const REFRESH_OK: &str = r#"{"message":"token refreshed"}"#;
    const TOKEN_INVALID: &str = r#"{"status":"token-invalid","message":"Expired token"}"#;
    const SEND_OK: &str = r#"{"id":"4385062","status":"waiting","message":"Waiting for SMS provider"}"#;

    fn pipeline(transport: FakeTransport, auto_update: bool) -> RequestPipeline {
        let http: Arc<dyn HttpTransport> = Arc::new(transport);
        let token = Arc::new(TokenManager::new(
            Credentials {
                email: Email::new("user@example.com").unwrap(),
                password: Password::new("secret").unwrap(),
            },
            auto_update,
            DEFAULT_REFRESH_COOLDOWN,
            None,
            Arc::clone(&http),
            "https://example.invalid/api".to_owned(),
        ));
        RequestPipeline::new(http, token, "https://example.invalid/api".to_owned())
    }

    // Seeds a known token without a wire login so tests count only the
    // requests they care about.
    async fn seeded_pipeline(transport: &FakeTransport, auto_update: bool) -> RequestPipeline {
        let pipeline = pipeline(transport.clone(), auto_update);
        pipeline.token.set("tok-seed").await;
        pipeline
    }

    #[tokio::test]
    async fn success_passes_body_through_with_bearer_header() {
        let transport = FakeTransport::new().respond(200, SEND_OK);
        let pipeline = seeded_pipeline(&transport, true).await;

        let body = pipeline
            .execute(Method::POST, "/message/sms/send", json!({"message": "hi"}))
            .await
            .unwrap();

        assert_eq!(body["id"], json!("4385062"));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("Authorization"), Some("Bearer tok-seed"));
        assert!(pipeline.token.is_checked().await);
    }

    #[tokio::test]
    async fn payload_is_normalized_before_dispatch() {
        let transport = FakeTransport::new().respond(200, SEND_OK);
        let pipeline = seeded_pipeline(&transport, true).await;

        pipeline
            .execute(
                Method::POST,
                "/message/sms/send",
                json!({
                    "mobile_phone": "+998 90 123 45 67",
                    "message": "hello",
                    "from_whom": "4546",
                    "callback_url": Value::Null,
                }),
            )
            .await
            .unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.form_field("mobile_phone"), Some("998901234567"));
        assert_eq!(request.form_field("from"), Some("4546"));
        assert_eq!(request.form_field("from_whom"), None);
        assert_eq!(request.form_field("callback_url"), None);
    }

    #[tokio::test]
    async fn expired_token_triggers_one_refresh_and_one_retry() {
        let transport = FakeTransport::new()
            .respond(401, TOKEN_INVALID)
            .respond(200, REFRESH_OK)
            .respond(200, SEND_OK);
        let pipeline = seeded_pipeline(&transport, true).await;

        let body = pipeline
            .execute(Method::POST, "/message/sms/send", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(body["status"], json!("waiting"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].url, "https://example.invalid/api/message/sms/send");
        assert_eq!(requests[1].method, Method::PATCH);
        assert_eq!(requests[1].url, "https://example.invalid/api/auth/refresh");
        assert_eq!(requests[2].url, "https://example.invalid/api/message/sms/send");
        assert_eq!(requests[2].header("Authorization"), Some("Bearer tok-seed"));
    }

    #[tokio::test]
    async fn second_auth_failure_is_terminal_blacklist() {
        let transport = FakeTransport::new()
            .respond(401, TOKEN_INVALID)
            .respond(200, REFRESH_OK)
            .respond(401, TOKEN_INVALID);
        let pipeline = seeded_pipeline(&transport, true).await;

        let err = pipeline
            .execute(Method::POST, "/message/sms/send", json!({"message": "hi"}))
            .await
            .unwrap_err();

        assert!(matches!(err, EskizError::TokenBlackListed { .. }));
        // primary + refresh + single retry, and nothing after
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn auto_update_disabled_fails_without_any_refresh() {
        let transport = FakeTransport::new().respond(401, TOKEN_INVALID);
        let pipeline = seeded_pipeline(&transport, false).await;

        let err = pipeline
            .execute(Method::POST, "/message/sms/send", json!({"message": "hi"}))
            .await
            .unwrap_err();

        assert!(matches!(err, EskizError::TokenBlackListed { .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn unrecoverable_refresh_falls_back_to_login() {
        let transport = FakeTransport::new()
            .respond(401, TOKEN_INVALID)
            .respond(401, TOKEN_INVALID) // refresh itself is rejected
            .respond(200, LOGIN_OK)
            .respond(200, SEND_OK);
        let pipeline = seeded_pipeline(&transport, true).await;

        let body = pipeline
            .execute(Method::POST, "/message/sms/send", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(body["status"], json!("waiting"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[2].url, "https://example.invalid/api/auth/login");
        assert_eq!(requests[3].header("Authorization"), Some("Bearer tok-live"));
    }

    #[tokio::test]
    async fn cooldown_blocked_refresh_fails_the_call() {
        let transport = FakeTransport::new()
            .respond(401, TOKEN_INVALID)
            .respond(200, REFRESH_OK)
            .respond(200, SEND_OK)
            .respond(401, TOKEN_INVALID);
        let pipeline = seeded_pipeline(&transport, true).await;

        // first call refreshes successfully and stamps the cooldown
        pipeline
            .execute(Method::POST, "/message/sms/send", json!({"message": "hi"}))
            .await
            .unwrap();

        // second call hits another auth failure inside the cooldown window
        let err = pipeline
            .execute(Method::POST, "/message/sms/send", json!({"message": "hi"}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EskizError::RefreshTooSoon { retry_after } if retry_after > Duration::ZERO
        ));
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test]
    async fn generic_400_maps_to_bad_request() {
        let transport = FakeTransport::new()
            .respond(400, r#"{"status":"error","message":"empty message"}"#);
        let pipeline = seeded_pipeline(&transport, true).await;

        let err = pipeline
            .execute(Method::POST, "/message/sms/send", json!({}))
            .await
            .unwrap_err();

        match err {
            EskizError::BadRequest {
                status_code,
                status,
                message,
            } => {
                assert_eq!(status_code, 400);
                assert_eq!(status.as_deref(), Some("error"));
                assert_eq!(message.as_deref(), Some("empty message"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn generic_401_without_token_status_maps_to_bad_request() {
        let transport = FakeTransport::new().respond(401, r#"{"message":"Unauthorized"}"#);
        let pipeline = seeded_pipeline(&transport, true).await;

        let err = pipeline
            .execute(Method::GET, "/auth/user", Value::Null)
            .await
            .unwrap_err();

        assert!(matches!(err, EskizError::BadRequest { status_code: 401, .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn unparseable_error_body_keeps_the_status_line() {
        let transport = FakeTransport::new().respond(502, "<html>bad gateway</html>");
        let pipeline = seeded_pipeline(&transport, true).await;

        let err = pipeline
            .execute(Method::GET, "/user/get-limit", Value::Null)
            .await
            .unwrap_err();

        match err {
            EskizError::Service {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 502);
                assert_eq!(message.as_deref(), Some("Bad Gateway"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn api_version_banner_is_accepted_as_success() {
        let transport = FakeTransport::new().respond(200, "API version: 2.1");
        let pipeline = seeded_pipeline(&transport, true).await;

        let body = pipeline
            .execute(Method::GET, "/auth/user", Value::Null)
            .await
            .unwrap();
        assert_eq!(body, json!({"api_version": "2.1"}));
    }
}
