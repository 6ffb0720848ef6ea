use serde::Serialize;

use crate::domain::validation::ValidationError;
use crate::domain::value::CallbackUrl;

#[derive(Debug, Clone, Default)]
/// Optional knobs for `send_sms`.
///
/// `from_whom` defaults to the shared `4546` short code; `callback_url`
/// overrides the client-wide default for this one message.
pub struct SendSmsOptions {
    pub from_whom: Option<String>,
    pub callback_url: Option<CallbackUrl>,
}

#[derive(Debug, Clone, Default)]
/// Optional knobs for `send_global_sms`.
///
/// Set `unicode` when the text is cyrillic; the gateway wants the flag as
/// `"1"`/`"0"`.
pub struct GlobalSmsOptions {
    pub callback_url: Option<CallbackUrl>,
    pub unicode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One entry of a `POST /message/sms/send-batch` dispatch.
///
/// `user_sms_id` is the caller-chosen correlation id echoed back in delivery
/// reports; `to` is sent as a string because the gateway rejects numeric
/// recipients in batch payloads.
pub struct SmsMessage {
    pub user_sms_id: String,
    pub to: String,
    pub text: String,
}

impl SmsMessage {
    /// Create a batch entry, validating that no part is empty.
    pub fn new(
        user_sms_id: impl Into<String>,
        to: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user_sms_id = user_sms_id.into();
        if user_sms_id.trim().is_empty() {
            return Err(ValidationError::Empty {
                field: "user_sms_id",
            });
        }
        let to = to.into();
        if to.trim().is_empty() {
            return Err(ValidationError::Empty { field: "to" });
        }
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ValidationError::Empty { field: "text" });
        }
        Ok(Self {
            user_sms_id,
            to,
            text,
        })
    }
}
