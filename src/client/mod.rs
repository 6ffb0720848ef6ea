//! Client layer: token lifecycle, the request pipeline, and the per-endpoint
//! pass-through methods.

mod http;
mod pipeline;
mod store;
mod token;

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;

use crate::domain::{
    ApiResponse, CallbackUrl, Contact, ContactCreated, Email, GlobalSmsOptions, Password,
    SendSmsOptions, SmsMessage, User, ValidationError,
};

use http::{HttpTransport, ReqwestTransport};
use pipeline::RequestPipeline;
use token::{Credentials, DEFAULT_REFRESH_COOLDOWN, TokenManager};

pub use store::{ESKIZ_TOKEN_KEY, EnvFileStore, TokenStore};

const DEFAULT_BASE_URL: &str = "https://notify.eskiz.uz/api";

/// Shared short code the gateway assigns to accounts without a registered
/// sender name.
const DEFAULT_FROM_WHOM: &str = "4546";

#[derive(Debug, thiserror::Error)]
/// Errors returned by [`EskizClient`].
///
/// Every variant is terminal for the call that produced it; the only retry
/// the library ever performs internally is the single post-refresh retry on
/// an auth-invalid reply.
pub enum EskizError {
    /// HTTP client / transport failure (DNS, TLS, timeouts, etc).
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    /// Credentials rejected at login, or the token is permanently invalid
    /// and unrecoverable.
    #[error("authentication failed: {}", .message.as_deref().unwrap_or("credentials rejected"))]
    Authentication {
        status: Option<String>,
        message: Option<String>,
    },

    /// The refresh cooldown guard tripped; no network call was made.
    #[error("token refresh attempted again within the cooldown, retry in {retry_after:?}")]
    RefreshTooSoon { retry_after: Duration },

    /// The gateway reported the token invalid and auto-update is disabled,
    /// or the single retry after a refresh still failed.
    #[error("token blacklisted: {}", .message.as_deref().unwrap_or("token rejected"))]
    TokenBlackListed {
        status: Option<String>,
        message: Option<String>,
    },

    /// Generic 400/401 unrelated to the token lifecycle.
    #[error("bad request ({status_code}): {}", .message.as_deref().unwrap_or("no message"))]
    BadRequest {
        status_code: u16,
        status: Option<String>,
        message: Option<String>,
    },

    /// Any other non-2xx status; original status code and message preserved.
    #[error("service error ({status_code}): {}", .message.as_deref().unwrap_or("no message"))]
    Service {
        status_code: u16,
        message: Option<String>,
    },

    /// Response body could not be parsed and no banner pattern matched.
    #[error("decode error: {0}")]
    Decode(#[source] Box<dyn StdError + Send + Sync>),

    /// One of the domain constructors rejected an invalid value.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Reading or writing the persisted token store failed.
    #[error("token store error: {0}")]
    Store(#[source] std::io::Error),
}

/// Builder for [`EskizClient`].
///
/// Use this to enable token persistence or to customize the base URL,
/// cooldown, timeout, or user-agent.
pub struct EskizClientBuilder {
    email: Email,
    password: Password,
    base_url: String,
    callback_url: Option<CallbackUrl>,
    store: Option<Box<dyn TokenStore>>,
    auto_update_token: bool,
    refresh_cooldown: Duration,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl EskizClientBuilder {
    /// Create a builder with the production base URL and defaults
    /// (auto-update on, 1-day refresh cooldown, no persistence).
    pub fn new(email: Email, password: Password) -> Self {
        Self {
            email,
            password,
            base_url: DEFAULT_BASE_URL.to_owned(),
            callback_url: None,
            store: None,
            auto_update_token: true,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
            timeout: None,
            user_agent: None,
        }
    }

    /// Override the gateway base URL (no trailing slash needed).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Default status-callback URL attached to outgoing messages.
    pub fn callback_url(mut self, callback_url: CallbackUrl) -> Self {
        self.callback_url = Some(callback_url);
        self
    }

    /// Persist the token to `.env` in the working directory.
    pub fn save_token(self) -> Self {
        self.token_store(Box::new(EnvFileStore::default()))
    }

    /// Persist the token to an env file at the given path.
    pub fn env_file_path(self, path: impl Into<std::path::PathBuf>) -> Self {
        self.token_store(Box::new(EnvFileStore::new(path)))
    }

    /// Persist the token through a caller-supplied store.
    pub fn token_store(mut self, store: Box<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Allow or forbid the automatic refresh-and-retry on an auth-invalid
    /// reply. On by default.
    pub fn auto_update_token(mut self, auto_update: bool) -> Self {
        self.auto_update_token = auto_update;
        self
    }

    /// Minimum interval between two successful forced token refreshes.
    pub fn refresh_cooldown(mut self, cooldown: Duration) -> Self {
        self.refresh_cooldown = cooldown;
        self
    }

    /// Set an HTTP client timeout applied to the entire request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the HTTP `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build an [`EskizClient`].
    pub fn build(self) -> Result<EskizClient, EskizError> {
        Url::parse(&self.base_url).map_err(|_| ValidationError::InvalidUrl {
            input: self.base_url.clone(),
        })?;
        let base_url = self.base_url.trim_end_matches('/').to_owned();

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = self.user_agent {
            builder = builder.user_agent(user_agent);
        }
        let client = builder
            .build()
            .map_err(|err| EskizError::Transport(Box::new(err)))?;

        let http: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport { client });
        let token = Arc::new(TokenManager::new(
            Credentials {
                email: self.email,
                password: self.password,
            },
            self.auto_update_token,
            self.refresh_cooldown,
            self.store,
            Arc::clone(&http),
            base_url.clone(),
        ));

        Ok(EskizClient {
            pipeline: RequestPipeline::new(http, Arc::clone(&token), base_url),
            token,
            callback_url: self.callback_url,
            user_cache: Mutex::new(None),
        })
    }
}

/// High-level Eskiz.uz gateway client.
///
/// Owns the [`TokenManager`] and the request pipeline; every method is a thin
/// mapping from a call to one HTTP request plus the automatic token handling
/// described on the builder.
pub struct EskizClient {
    pipeline: RequestPipeline,
    token: Arc<TokenManager>,
    callback_url: Option<CallbackUrl>,
    user_cache: Mutex<Option<User>>,
}

impl std::fmt::Debug for EskizClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EskizClient").finish_non_exhaustive()
    }
}

impl EskizClient {
    /// Create a client with default settings.
    ///
    /// For persistence or other customization, use [`EskizClient::builder`].
    pub fn new(email: Email, password: Password) -> Result<Self, EskizError> {
        Self::builder(email, password).build()
    }

    /// Start building a client with custom settings.
    pub fn builder(email: Email, password: Password) -> EskizClientBuilder {
        EskizClientBuilder::new(email, password)
    }

    // ---- token lifecycle ----

    /// Token currently in use, acquiring one if the cache is empty.
    pub async fn current_token(&self) -> Result<String, EskizError> {
        self.token.current_token().await
    }

    /// Force a credential exchange, replacing any cached token.
    pub async fn login(&self) -> Result<String, EskizError> {
        self.token.login().await
    }

    /// Force a token refresh, subject to the cooldown guard.
    pub async fn refresh_token(&self) -> Result<String, EskizError> {
        self.token.refresh().await
    }

    /// Inject a token obtained elsewhere. It is used as-is until the gateway
    /// rejects it.
    pub async fn set_token(&self, value: impl Into<String>) {
        self.token.set(value).await
    }

    /// `DELETE /auth/invalidate`: revoke the token server-side, then drop it
    /// from the in-memory cache.
    pub async fn invalidate_token(&self) -> Result<ApiResponse, EskizError> {
        let body = self
            .pipeline
            .execute(Method::DELETE, "/auth/invalidate", Value::Null)
            .await?;
        self.token.invalidate().await;
        decode(body)
    }

    // ---- account ----

    /// `GET /auth/user`: fetch the account profile. The result is cached for
    /// the endpoints that need a `user_id`.
    pub async fn user(&self) -> Result<User, EskizError> {
        let body = self
            .pipeline
            .execute(Method::GET, "/auth/user", Value::Null)
            .await?;
        let user: User = decode(body)?;
        *self.user_cache.lock().await = Some(user.clone());
        Ok(user)
    }

    async fn cached_user_id(&self) -> Result<Option<i64>, EskizError> {
        if let Some(user) = self.user_cache.lock().await.as_ref() {
            return Ok(user.id);
        }
        Ok(self.user().await?.id)
    }

    // ---- contacts ----

    /// `POST /contact`: create an address-book entry.
    pub async fn add_contact(
        &self,
        name: &str,
        email: &str,
        group: &str,
        mobile_phone: &str,
    ) -> Result<ContactCreated, EskizError> {
        let body = self
            .pipeline
            .execute(
                Method::POST,
                "/contact",
                json!({
                    "name": name,
                    "email": email,
                    "group": group,
                    "mobile_phone": mobile_phone,
                }),
            )
            .await?;
        let contact_id = body
            .pointer("/data")
            .and_then(Value::as_i64)
            .ok_or_else(|| decode_failure("contact reply did not contain an id"))?;
        Ok(ContactCreated { contact_id })
    }

    /// `PUT /contact/{id}`: update an entry. The gateway answers with a
    /// one-element array, or nothing at all for an unknown id.
    pub async fn update_contact(
        &self,
        contact_id: i64,
        name: &str,
        group: &str,
        mobile_phone: &str,
    ) -> Result<Option<Contact>, EskizError> {
        let body = self
            .pipeline
            .execute(
                Method::PUT,
                &format!("/contact/{contact_id}"),
                json!({
                    "name": name,
                    "group": group,
                    "mobile_phone": mobile_phone,
                }),
            )
            .await?;
        first_contact(body)
    }

    /// `GET /contact/{id}`: look up an entry; `None` when the gateway has no
    /// contact under that id.
    pub async fn get_contact(&self, contact_id: i64) -> Result<Option<Contact>, EskizError> {
        let body = self
            .pipeline
            .execute(Method::GET, &format!("/contact/{contact_id}"), Value::Null)
            .await?;
        first_contact(body)
    }

    /// `DELETE /contact/{id}`.
    pub async fn delete_contact(&self, contact_id: i64) -> Result<ApiResponse, EskizError> {
        let body = self
            .pipeline
            .execute(
                Method::DELETE,
                &format!("/contact/{contact_id}"),
                Value::Null,
            )
            .await?;
        decode(body)
    }

    // ---- sending ----

    /// `POST /message/sms/send`: send one SMS to an Uzbek number.
    ///
    /// The phone number may carry `+` and spaces; formatting is stripped
    /// before dispatch.
    pub async fn send_sms(
        &self,
        mobile_phone: &str,
        message: &str,
        options: SendSmsOptions,
    ) -> Result<ApiResponse, EskizError> {
        let payload = json!({
            "mobile_phone": mobile_phone,
            "message": message,
            "from_whom": options.from_whom.as_deref().unwrap_or(DEFAULT_FROM_WHOM),
            (CallbackUrl::FIELD): self.callback_for(options.callback_url.as_ref()),
        });
        let body = self
            .pipeline
            .execute(Method::POST, "/message/sms/send", payload)
            .await?;
        decode(body)
    }

    /// `POST /message/sms/send-global`: send one SMS to an international
    /// number (`country_code` such as `"US"`).
    pub async fn send_global_sms(
        &self,
        mobile_phone: &str,
        message: &str,
        country_code: &str,
        options: GlobalSmsOptions,
    ) -> Result<ApiResponse, EskizError> {
        let payload = json!({
            "mobile_phone": mobile_phone,
            "message": message,
            "country_code": country_code,
            "unicode": if options.unicode { "1" } else { "0" },
            (CallbackUrl::FIELD): self.callback_for(options.callback_url.as_ref()),
        });
        let body = self
            .pipeline
            .execute(Method::POST, "/message/sms/send-global", payload)
            .await?;
        decode(body)
    }

    /// `POST /message/sms/send-batch`: send a dispatch of individually
    /// addressed messages.
    pub async fn send_batch(
        &self,
        messages: Vec<SmsMessage>,
        dispatch_id: i64,
        from_whom: Option<String>,
    ) -> Result<ApiResponse, EskizError> {
        if messages.is_empty() {
            return Err(ValidationError::Empty { field: "messages" }.into());
        }
        let payload = json!({
            "messages": messages,
            "from_whom": from_whom.as_deref().unwrap_or(DEFAULT_FROM_WHOM),
            "dispatch_id": dispatch_id,
        });
        let body = self
            .pipeline
            .execute(Method::POST, "/message/sms/send-batch", payload)
            .await?;
        decode(body)
    }

    // ---- reports ----

    /// `GET /message/sms/get-user-messages` for a date range
    /// (`YYYY-MM-DD HH:MM` timestamps, gateway-local time).
    pub async fn get_user_messages(
        &self,
        from_date: &str,
        to_date: &str,
    ) -> Result<ApiResponse, EskizError> {
        let user_id = self.cached_user_id().await?;
        let body = self
            .pipeline
            .execute(
                Method::GET,
                "/message/sms/get-user-messages",
                json!({
                    "from_date": from_date,
                    "to_date": to_date,
                    "user_id": user_id,
                }),
            )
            .await?;
        decode(body)
    }

    /// `GET /message/sms/get-user-messages-by-dispatch`.
    pub async fn get_user_messages_by_dispatch(
        &self,
        dispatch_id: i64,
    ) -> Result<ApiResponse, EskizError> {
        let user_id = self.cached_user_id().await?;
        let body = self
            .pipeline
            .execute(
                Method::GET,
                "/message/sms/get-user-messages-by-dispatch",
                json!({ "dispatch_id": dispatch_id, "user_id": user_id }),
            )
            .await?;
        decode(body)
    }

    /// `GET /message/sms/get-dispatch-status`.
    pub async fn get_dispatch_status(&self, dispatch_id: i64) -> Result<ApiResponse, EskizError> {
        let user_id = self.cached_user_id().await?;
        let body = self
            .pipeline
            .execute(
                Method::GET,
                "/message/sms/get-dispatch-status",
                json!({ "dispatch_id": dispatch_id, "user_id": user_id }),
            )
            .await?;
        decode(body)
    }

    /// `POST /user/totals`: yearly usage totals.
    pub async fn totals(&self, year: i32) -> Result<ApiResponse, EskizError> {
        let user_id = self.cached_user_id().await?;
        let body = self
            .pipeline
            .execute(
                Method::POST,
                "/user/totals",
                json!({ "year": year, "user_id": user_id }),
            )
            .await?;
        decode(body)
    }

    /// `GET /user/get-limit`: remaining SMS limit.
    pub async fn get_limit(&self) -> Result<ApiResponse, EskizError> {
        let body = self
            .pipeline
            .execute(Method::GET, "/user/get-limit", Value::Null)
            .await?;
        decode(body)
    }

    // ---- templates ----

    /// `POST /template`.
    pub async fn create_template(&self, name: &str, text: &str) -> Result<ApiResponse, EskizError> {
        let body = self
            .pipeline
            .execute(
                Method::POST,
                "/template",
                json!({ "name": name, "text": text }),
            )
            .await?;
        decode(body)
    }

    /// `PUT /template/{id}`.
    pub async fn update_template(
        &self,
        template_id: i64,
        name: &str,
        text: &str,
    ) -> Result<ApiResponse, EskizError> {
        let body = self
            .pipeline
            .execute(
                Method::PUT,
                &format!("/template/{template_id}"),
                json!({ "name": name, "text": text }),
            )
            .await?;
        decode(body)
    }

    /// `GET /template/{id}`.
    pub async fn get_template(&self, template_id: i64) -> Result<ApiResponse, EskizError> {
        let body = self
            .pipeline
            .execute(Method::GET, &format!("/template/{template_id}"), Value::Null)
            .await?;
        decode(body)
    }

    /// `GET /template`: list all templates.
    pub async fn get_templates(&self) -> Result<ApiResponse, EskizError> {
        let body = self
            .pipeline
            .execute(Method::GET, "/template", Value::Null)
            .await?;
        decode(body)
    }

    fn callback_for<'a>(&'a self, request_level: Option<&'a CallbackUrl>) -> Option<&'a str> {
        request_level
            .or(self.callback_url.as_ref())
            .map(CallbackUrl::as_str)
    }
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, EskizError> {
    serde_json::from_value(body).map_err(|err| EskizError::Decode(Box::new(err)))
}

fn decode_failure(message: &str) -> EskizError {
    EskizError::Decode(message.to_owned().into())
}

fn first_contact(body: Value) -> Result<Option<Contact>, EskizError> {
    match body {
        Value::Array(items) => match items.into_iter().next() {
            Some(item) => Ok(Some(decode(item)?)),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}
