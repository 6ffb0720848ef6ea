//! Transport layer: wire-format details (payload normalization, response
//! classification).

mod payload;
mod response;

pub(crate) use payload::{RequestBody, encode_body, normalize_payload};
pub(crate) use response::{
    RawResponse, body_message, body_status, decode_response, is_success,
};
