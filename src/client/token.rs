//! Bearer-token lifecycle: acquisition, caching, persistence, and the
//! refresh cooldown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::EskizError;
use crate::client::http::HttpTransport;
use crate::client::store::{ESKIZ_TOKEN_KEY, TokenStore};
use crate::domain::{Email, Password};
use crate::transport::{
    RawResponse, RequestBody, body_message, body_status, decode_response, encode_body, is_success,
};

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const REFRESH_PATH: &str = "/auth/refresh";

/// Default minimum interval between two successful forced refreshes.
pub(crate) const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub(crate) struct Credentials {
    pub email: Email,
    pub password: Password,
}

#[derive(Debug, Default)]
struct TokenState {
    value: Option<String>,
    /// True once the server has accepted this value (login, refresh, or a
    /// successful authenticated call) since it was last set.
    checked: bool,
    last_refreshed_at: Option<Instant>,
}

/// Owns the credentials and the cached bearer token.
///
/// All state sits behind one async mutex, so concurrent callers never run
/// duplicate logins or refreshes: whoever arrives second waits for the
/// in-flight exchange and then sees its result.
pub(crate) struct TokenManager {
    credentials: Credentials,
    auto_update: bool,
    cooldown: Duration,
    store: Option<Box<dyn TokenStore>>,
    http: Arc<dyn HttpTransport>,
    base_url: String,
    state: Mutex<TokenState>,
}

impl TokenManager {
    pub(crate) fn new(
        credentials: Credentials,
        auto_update: bool,
        cooldown: Duration,
        store: Option<Box<dyn TokenStore>>,
        http: Arc<dyn HttpTransport>,
        base_url: String,
    ) -> Self {
        Self {
            credentials,
            auto_update,
            cooldown,
            store,
            http,
            base_url,
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Whether the pipeline may refresh and retry on an auth-invalid reply.
    pub(crate) fn auto_update(&self) -> bool {
        self.auto_update
    }

    /// Return a token for immediate use.
    ///
    /// A cached value is served as-is, checked or not; an unchecked value is
    /// validated by the first authenticated call, not preflighted here. With
    /// an empty cache the persisted store is consulted first, then a fresh
    /// login is performed.
    pub(crate) async fn current_token(&self) -> Result<String, EskizError> {
        let mut state = self.state.lock().await;
        if let Some(value) = &state.value {
            return Ok(value.clone());
        }
        if let Some(store) = &self.store {
            if let Some(stored) = store.get(ESKIZ_TOKEN_KEY).map_err(EskizError::Store)? {
                debug!("restored token from store, not yet validated");
                state.value = Some(stored.clone());
                state.checked = false;
                return Ok(stored);
            }
        }
        self.login_locked(&mut state).await
    }

    /// Exchange the credentials for a fresh token, replacing any cached one.
    pub(crate) async fn login(&self) -> Result<String, EskizError> {
        let mut state = self.state.lock().await;
        self.login_locked(&mut state).await
    }

    async fn login_locked(&self, state: &mut TokenState) -> Result<String, EskizError> {
        let payload = json!({
            (Email::FIELD): self.credentials.email.as_str(),
            (Password::FIELD): self.credentials.password.as_str(),
        });
        let raw = self
            .dispatch(Method::POST, LOGIN_PATH, encode_body(&payload), None)
            .await?;

        // A 401 here means the credentials themselves were rejected,
        // unlike a 401 on a protected endpoint.
        if raw.status_code == 401 {
            return Err(EskizError::Authentication {
                status: body_status(&raw.body),
                message: body_message(&raw.body, raw.status_code),
            });
        }
        if !is_success(raw.status_code) {
            return Err(EskizError::Service {
                status_code: raw.status_code,
                message: body_message(&raw.body, raw.status_code),
            });
        }

        let token = raw
            .body
            .pointer("/data/token")
            .and_then(Value::as_str)
            .ok_or_else(|| EskizError::Service {
                status_code: raw.status_code,
                message: Some("login reply did not contain a token".to_owned()),
            })?
            .to_owned();

        state.value = Some(token.clone());
        state.checked = true;
        self.persist(&token)?;
        Ok(token)
    }

    /// Re-validate or re-issue the cached token via `PATCH /auth/refresh`.
    ///
    /// Fails fast with [`EskizError::RefreshTooSoon`], before any network
    /// call, when invoked again inside the cooldown window. On an
    /// auth-invalid reply the cached value is cleared and
    /// [`EskizError::Authentication`] is surfaced; the caller decides
    /// whether to fall back to a fresh login.
    pub(crate) async fn refresh(&self) -> Result<String, EskizError> {
        let mut state = self.state.lock().await;

        let Some(token) = state.value.clone() else {
            // Nothing to refresh; a login yields a known-good token directly
            // and is not throttled by the cooldown.
            return self.login_locked(&mut state).await;
        };

        if let Some(last) = state.last_refreshed_at {
            let elapsed = last.elapsed();
            if elapsed < self.cooldown {
                return Err(EskizError::RefreshTooSoon {
                    retry_after: self.cooldown - elapsed,
                });
            }
        }

        debug!("refreshing the token");
        let raw = self
            .dispatch(Method::PATCH, REFRESH_PATH, RequestBody::Empty, Some(&token))
            .await?;

        if raw.token_invalid || raw.status_code == 401 {
            warn!("token could not be refreshed, discarding it");
            state.value = None;
            state.checked = false;
            return Err(EskizError::Authentication {
                status: body_status(&raw.body),
                message: body_message(&raw.body, raw.status_code),
            });
        }
        if !is_success(raw.status_code) {
            return Err(EskizError::Service {
                status_code: raw.status_code,
                message: body_message(&raw.body, raw.status_code),
            });
        }

        // The gateway usually answers with the same token; adopt a re-issued
        // one when present.
        let token = match raw.body.pointer("/data/token").and_then(Value::as_str) {
            Some(reissued) if reissued != token => {
                let reissued = reissued.to_owned();
                state.value = Some(reissued.clone());
                self.persist(&reissued)?;
                reissued
            }
            _ => token,
        };
        state.checked = true;
        state.last_refreshed_at = Some(Instant::now());
        Ok(token)
    }

    /// Clear the in-memory token. The persisted store is left untouched; the
    /// next [`Self::current_token`] re-validates or re-logs-in.
    pub(crate) async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        state.value = None;
        state.checked = false;
    }

    /// Caller-supplied override; the value is treated as unchecked until the
    /// server accepts it.
    pub(crate) async fn set(&self, value: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.value = Some(value.into());
        state.checked = false;
    }

    /// Record that the server accepted the current value.
    pub(crate) async fn mark_checked(&self) {
        let mut state = self.state.lock().await;
        if state.value.is_some() {
            state.checked = true;
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_checked(&self) -> bool {
        self.state.lock().await.checked
    }

    fn persist(&self, token: &str) -> Result<(), EskizError> {
        if let Some(store) = &self.store {
            store.set(ESKIZ_TOKEN_KEY, token).map_err(EskizError::Store)?;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: RequestBody,
        bearer: Option<&str>,
    ) -> Result<RawResponse, EskizError> {
        let url = format!("{}{}", self.base_url, path);
        let headers = match bearer {
            Some(token) => vec![("Authorization".to_owned(), format!("Bearer {token}"))],
            None => Vec::new(),
        };
        let response = self
            .http
            .send(method, &url, body, headers)
            .await
            .map_err(EskizError::Transport)?;
        debug!(status_code = response.status, body = %response.body, "auth endpoint response");
        decode_response(response.status, &response.body)
            .map_err(|err| EskizError::Decode(Box::new(err)))
    }
}
