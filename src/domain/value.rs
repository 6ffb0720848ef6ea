use crate::domain::validation::ValidationError;

use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Eskiz account email used as the login identifier.
///
/// Invariant: non-empty after trimming.
pub struct Email(String);

impl Email {
    /// Form field name used by the gateway (`email`).
    pub const FIELD: &'static str = "email";

    /// Create a validated [`Email`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: Self::FIELD });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the validated email.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Eskiz account password.
///
/// Invariant: must not be empty (whitespace is preserved and allowed).
pub struct Password(String);

impl Password {
    /// Form field name used by the gateway (`password`).
    pub const FIELD: &'static str = "password";

    /// Create a validated [`Password`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::Empty { field: Self::FIELD });
        }
        Ok(Self(value))
    }

    /// Borrow the password as provided.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Status-callback URL the gateway POSTs delivery reports to.
///
/// Invariant: parses as an absolute http(s) URL.
pub struct CallbackUrl(String);

impl CallbackUrl {
    /// Form field name used by the gateway (`callback_url`).
    pub const FIELD: &'static str = "callback_url";

    /// Create a validated [`CallbackUrl`].
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let parsed = Url::parse(&value).map_err(|_| ValidationError::InvalidUrl {
            input: value.clone(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ValidationError::InvalidUrl { input: value });
        }
        Ok(Self(value))
    }

    /// Borrow the validated URL.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
