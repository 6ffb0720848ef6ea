//! Domain layer: strong types with validation and invariants (no I/O).

mod request;
mod response;
mod validation;
mod value;

pub use request::{GlobalSmsOptions, SendSmsOptions, SmsMessage};
pub use response::{ApiResponse, Contact, ContactCreated, User};
pub use validation::ValidationError;
pub use value::{CallbackUrl, Email, Password};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rejects_empty() {
        assert!(matches!(
            Email::new("   "),
            Err(ValidationError::Empty {
                field: Email::FIELD
            })
        ));
    }

    #[test]
    fn email_is_trimmed() {
        let email = Email::new(" user@example.com ").unwrap();
        assert_eq!(email.as_str(), "user@example.com");
    }

    #[test]
    fn password_rejects_empty() {
        assert!(matches!(
            Password::new(""),
            Err(ValidationError::Empty {
                field: Password::FIELD
            })
        ));
    }

    #[test]
    fn password_preserves_whitespace() {
        let password = Password::new(" p4ss ").unwrap();
        assert_eq!(password.as_str(), " p4ss ");
    }

    #[test]
    fn callback_url_requires_http_scheme() {
        assert!(CallbackUrl::new("https://example.com/hook").is_ok());
        assert!(CallbackUrl::new("http://example.com/hook").is_ok());
        assert!(matches!(
            CallbackUrl::new("ftp://example.com/hook"),
            Err(ValidationError::InvalidUrl { .. })
        ));
        assert!(matches!(
            CallbackUrl::new("not a url"),
            Err(ValidationError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn sms_message_rejects_blank_parts() {
        assert!(SmsMessage::new("", "998901234567", "hi").is_err());
        assert!(SmsMessage::new("sms1", " ", "hi").is_err());
        assert!(SmsMessage::new("sms1", "998901234567", "").is_err());
        let msg = SmsMessage::new("sms1", "998901234567", "hi").unwrap();
        assert_eq!(msg.user_sms_id, "sms1");
    }
}
