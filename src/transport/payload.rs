use serde_json::{Map, Value};

/// Field the public API accepts in place of the reserved word `from`.
pub(crate) const FROM_WHOM: &str = "from_whom";
/// Wire name of the sender id field.
pub(crate) const FROM: &str = "from";
/// Recipient field whose value gets its formatting stripped.
pub(crate) const MOBILE_PHONE: &str = "mobile_phone";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Json(Value),
}

/// Normalize a payload before it goes on the wire.
///
/// Pure and deterministic:
/// - `from_whom` is renamed to `from`,
/// - `mobile_phone` has `+` and spaces stripped,
/// - `null` entries are dropped (the gateway rejects explicit nulls for
///   optional fields such as `callback_url`).
///
/// Non-object payloads pass through untouched.
pub(crate) fn normalize_payload(payload: Value) -> Value {
    let Value::Object(map) = payload else {
        return payload;
    };

    let mut normalized = Map::with_capacity(map.len());
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        match key.as_str() {
            FROM_WHOM => {
                normalized.insert(FROM.to_owned(), value);
            }
            MOBILE_PHONE => {
                let value = match value {
                    Value::String(phone) => {
                        Value::String(phone.replace(['+', ' '], ""))
                    }
                    other => other,
                };
                normalized.insert(key, value);
            }
            _ => {
                normalized.insert(key, value);
            }
        }
    }
    Value::Object(normalized)
}

/// Pick the wire encoding for a normalized payload.
///
/// Flat payloads go out form-encoded; anything nested (batch dispatches) is
/// sent as JSON. An empty or absent payload produces no body at all.
pub(crate) fn encode_body(payload: &Value) -> RequestBody {
    match payload {
        Value::Null => RequestBody::Empty,
        Value::Object(map) if map.is_empty() => RequestBody::Empty,
        Value::Object(map) => {
            let mut fields = Vec::with_capacity(map.len());
            for (key, value) in map {
                match scalar_to_string(value) {
                    Some(encoded) => fields.push((key.clone(), encoded)),
                    None => return RequestBody::Json(payload.clone()),
                }
            }
            RequestBody::Form(fields)
        }
        other => RequestBody::Json(other.clone()),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn from_whom_is_renamed_to_from() {
        let normalized = normalize_payload(json!({"from_whom": "4546", "message": "hi"}));
        assert_eq!(normalized.get("from"), Some(&json!("4546")));
        assert!(normalized.get("from_whom").is_none());
        assert_eq!(normalized.get("message"), Some(&json!("hi")));
    }

    #[test]
    fn mobile_phone_formatting_is_stripped() {
        let normalized = normalize_payload(json!({"mobile_phone": "+998 90 123 45 67"}));
        assert_eq!(normalized.get("mobile_phone"), Some(&json!("998901234567")));
    }

    #[test]
    fn null_entries_are_dropped() {
        let normalized =
            normalize_payload(json!({"message": "hi", "callback_url": Value::Null}));
        assert!(normalized.get("callback_url").is_none());
        assert_eq!(normalized.get("message"), Some(&json!("hi")));
    }

    #[test]
    fn non_object_payloads_pass_through() {
        assert_eq!(normalize_payload(Value::Null), Value::Null);
        assert_eq!(normalize_payload(json!([1, 2])), json!([1, 2]));
    }

    #[test]
    fn flat_payloads_are_form_encoded() {
        let body = encode_body(&json!({"year": 2024, "test": true, "name": "n"}));
        let RequestBody::Form(fields) = body else {
            panic!("expected form body, got {body:?}");
        };
        assert!(fields.contains(&("year".to_owned(), "2024".to_owned())));
        assert!(fields.contains(&("test".to_owned(), "true".to_owned())));
        assert!(fields.contains(&("name".to_owned(), "n".to_owned())));
    }

    #[test]
    fn nested_payloads_are_json_encoded() {
        let payload = json!({
            "messages": [{"user_sms_id": "sms1", "to": "998901234567", "text": "hi"}],
            "from": "4546"
        });
        assert_eq!(encode_body(&payload), RequestBody::Json(payload.clone()));
    }

    #[test]
    fn empty_payloads_produce_no_body() {
        assert_eq!(encode_body(&Value::Null), RequestBody::Empty);
        assert_eq!(encode_body(&json!({})), RequestBody::Empty);
    }
}
