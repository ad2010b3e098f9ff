//! Signed message envelopes and the wire codec.
//!
//! Every frame on the wire is `<json-envelope>.<hex-hmac-sha256>`. The
//! signature covers the serialized envelope bytes exactly as sent, so
//! verification recomputes the mac over the payload half of the frame before
//! ever parsing it.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::Result;

type HmacSha256 = Hmac<Sha256>;

/// Message kinds carried inside an envelope, tagged on the wire as
/// `{"type": "..."}`. Kinds we do not recognize deserialize as [`Unknown`]
/// so a newer backend never breaks the receive loop.
///
/// [`Unknown`]: MessageKind::Unknown
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageKind {
    Auth,
    Ping { id: String },
    Pong { id: String },
    Notification { data: serde_json::Value },
    #[serde(other)]
    Unknown,
}

/// The logical unit of communication: timestamp + unique id + payload.
///
/// A fresh envelope (new id, new timestamp) is created per send and consumed
/// once at receive time; envelopes are never persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub timestamp: i64,
    pub message_id: String,
    pub message: MessageKind,
}

impl Envelope {
    pub fn new(message: MessageKind) -> Self {
        Self {
            timestamp: Utc::now().timestamp(),
            message_id: Uuid::new_v4().to_string(),
            message,
        }
    }
}

/// Why an inbound frame was rejected. Per-frame and non-fatal: the caller
/// logs and drops the frame, the receive loop continues.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("malformed frame: expected exactly one '.' separator")]
    MalformedFrame,

    #[error("bad signature")]
    BadSignature,

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("envelope expired: {age}s old, tolerance is {tolerance}s")]
    Expired { age: i64, tolerance: i64 },
}

/// Serialize and sign an envelope into its wire form.
pub fn sign(envelope: &Envelope, secret: &[u8]) -> Result<String> {
    let payload = serde_json::to_string(envelope)?;
    let signature = hex::encode(mac_over(payload.as_bytes(), secret).finalize().into_bytes());
    Ok(format!("{payload}.{signature}"))
}

/// Verify a wire frame against the shared secret and parse the envelope.
///
/// `max_age` is the expiry tolerance in seconds applied symmetrically around
/// the current wall clock.
pub fn verify(frame: &str, secret: &[u8], max_age: i64) -> std::result::Result<Envelope, VerifyError> {
    verify_at(frame, secret, max_age, Utc::now().timestamp())
}

/// [`verify`] with an injected clock, for tests.
pub fn verify_at(
    frame: &str,
    secret: &[u8],
    max_age: i64,
    now: i64,
) -> std::result::Result<Envelope, VerifyError> {
    let parts: Vec<&str> = frame.split('.').collect();
    if parts.len() != 2 {
        return Err(VerifyError::MalformedFrame);
    }
    let (payload, signature) = (parts[0], parts[1]);

    let expected = hex::decode(signature).map_err(|_| VerifyError::BadSignature)?;
    // verify_slice is a constant-time comparison.
    mac_over(payload.as_bytes(), secret)
        .verify_slice(&expected)
        .map_err(|_| VerifyError::BadSignature)?;

    let envelope: Envelope =
        serde_json::from_str(payload).map_err(|e| VerifyError::MalformedPayload(e.to_string()))?;

    let age = (now - envelope.timestamp).abs();
    if age > max_age {
        return Err(VerifyError::Expired {
            age,
            tolerance: max_age,
        });
    }

    Ok(envelope)
}

fn mac_over(payload: &[u8], secret: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts keys of any length");
    mac.update(payload);
    mac
}
