//! Webhook payload parsing and validation.
//!
//! Turns an authenticated raw body into a [`Message`]. Every failure maps to a
//! single `invalid_payload` outcome at the HTTP boundary; the variants below
//! only exist so the reason can be logged.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::store::Message;
use crate::util::parse_ts;

/// Longest accepted `text`, in characters.
pub const MAX_TEXT_CHARS: usize = 4096;

static MSISDN_REGEX: OnceLock<Regex> = OnceLock::new();

/// Why a payload was rejected.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed JSON body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message_id must not be empty")]
    EmptyMessageId,

    #[error("{field} is not a valid MSISDN")]
    InvalidMsisdn { field: &'static str },

    #[error("ts is not a valid date-time: {0:?}")]
    InvalidTimestamp(String),

    #[error("text exceeds 4096 characters ({0})")]
    TextTooLong(usize),
}

/// Wire shape of the webhook body. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct WebhookPayload {
    message_id: String,
    #[serde(rename = "from")]
    from_msisdn: String,
    #[serde(rename = "to")]
    to_msisdn: String,
    ts: String,
    #[serde(default)]
    text: Option<String>,
}

/// Check the `+<digits>` identifier pattern.
pub fn is_valid_msisdn(value: &str) -> bool {
    let regex = MSISDN_REGEX.get_or_init(|| Regex::new(r"^\+[0-9]+$").expect("valid regex"));
    regex.is_match(value)
}

/// Parse and validate a raw webhook body.
pub fn validate(raw: &[u8]) -> Result<Message, ValidationError> {
    let payload: WebhookPayload = serde_json::from_slice(raw)?;

    if payload.message_id.is_empty() {
        return Err(ValidationError::EmptyMessageId);
    }

    if !is_valid_msisdn(&payload.from_msisdn) {
        return Err(ValidationError::InvalidMsisdn { field: "from" });
    }

    if !is_valid_msisdn(&payload.to_msisdn) {
        return Err(ValidationError::InvalidMsisdn { field: "to" });
    }

    let ts = parse_ts(&payload.ts)
        .ok_or_else(|| ValidationError::InvalidTimestamp(payload.ts.clone()))?;

    if let Some(text) = &payload.text {
        let chars = text.chars().count();
        if chars > MAX_TEXT_CHARS {
            return Err(ValidationError::TextTooLong(chars));
        }
    }

    Ok(Message {
        message_id: payload.message_id,
        from_msisdn: payload.from_msisdn,
        to_msisdn: payload.to_msisdn,
        ts,
        text: payload.text,
    })
}
