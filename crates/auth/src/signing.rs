//! Request signing for token issuance.
//!
//! A client proves possession of its secret by sending
//! `Signature: base64url(HMAC-SHA256(secret, canonical body))`.
//! The canonical body is the JSON re-encoding of the parsed [`TokenRequest`],
//! so whitespace and key order in what the client sent do not matter.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use warden_core::AccountId;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Signature";

/// How far `request_time` may drift from the server clock, either direction.
pub fn request_time_threshold() -> Duration {
    Duration::minutes(2)
}

/// Body of a token request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    #[serde(rename = "clientID")]
    pub client_id: String,

    #[serde(rename = "accountID", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,

    /// Unix time in nanoseconds.
    pub request_time: i64,

    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_lifetime: Option<u64>,
}

impl TokenRequest {
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn request_time(&self) -> Option<DateTime<Utc>> {
        let secs = self.request_time.div_euclid(1_000_000_000);
        let nanos = self.request_time.rem_euclid(1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nanos)
    }

    pub fn requested_lifetime(&self) -> Option<Duration> {
        self.requested_lifetime
            .and_then(|s| i64::try_from(s).ok())
            .and_then(Duration::try_seconds)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header malformed")]
    Malformed,

    #[error("signature does not match")]
    Mismatch,

    #[error("request time outside accepted window")]
    OutsideWindow,

    #[error("request body could not be canonicalized")]
    Canonicalize,
}

/// `|now - request_time| <= threshold`.
pub fn check_request_time(request: &TokenRequest, now: DateTime<Utc>) -> Result<(), SignatureError> {
    let at = request.request_time().ok_or(SignatureError::OutsideWindow)?;
    let drift = if at > now { at - now } else { now - at };
    if drift > request_time_threshold() {
        return Err(SignatureError::OutsideWindow);
    }
    Ok(())
}

pub fn sign(secret: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => unreachable!("hmac key length is unrestricted"),
    };
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

pub fn encode_signature(mac: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(mac)
}

/// Header value a client would send for `request`.
pub fn signature_for(secret: &[u8], request: &TokenRequest) -> Result<String, SignatureError> {
    let body = request.canonical_bytes().map_err(|_| SignatureError::Canonicalize)?;
    Ok(encode_signature(&sign(secret, &body)))
}

/// Constant-time check of `header` against the expected MAC over `request`.
pub fn verify_signature(secret: &[u8], request: &TokenRequest, header: &str) -> Result<(), SignatureError> {
    let provided = URL_SAFE_NO_PAD
        .decode(header.trim())
        .map_err(|_| SignatureError::Malformed)?;

    let body = request.canonical_bytes().map_err(|_| SignatureError::Canonicalize)?;
    let expected = sign(secret, &body);

    if expected.ct_eq(&provided).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
