//! Typed Rust client for the Eskiz.uz SMS gateway HTTP API.
//!
//! The crate is layered: a domain layer of validated types, a transport
//! layer for wire-format quirks (payload normalization, the gateway's
//! plaintext banner), and a client layer owning the bearer-token lifecycle.
//! Tokens are obtained via login, cached, optionally persisted to a
//! `.env`-style file, attached to every call, and refreshed transparently
//! with a single bounded retry when the gateway reports them expired.
//!
//! ```rust,no_run
//! use eskiz_sms::{Email, EskizClient, Password, SendSmsOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), eskiz_sms::EskizError> {
//!     let client = EskizClient::builder(
//!         Email::new("user@example.com")?,
//!         Password::new("secret")?,
//!     )
//!     .save_token()
//!     .build()?;
//!
//!     let response = client
//!         .send_sms("+998 90 123 45 67", "hello", SendSmsOptions::default())
//!         .await?;
//!     println!("queued: {:?}", response.id);
//!     Ok(())
//! }
//! ```
#![forbid(unsafe_code)]

pub mod client;
pub mod domain;
mod transport;

pub use client::{
    ESKIZ_TOKEN_KEY, EnvFileStore, EskizClient, EskizClientBuilder, EskizError, TokenStore,
};
pub use domain::{
    ApiResponse, CallbackUrl, Contact, ContactCreated, Email, GlobalSmsOptions, Password,
    SendSmsOptions, SmsMessage, User, ValidationError,
};
