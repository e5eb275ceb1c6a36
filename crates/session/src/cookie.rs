//! Tamper-evident session cookies.
//!
//! Value layout, base64url without padding:
//!
//! ```text
//! timestamp | payload | mac
//! ```
//!
//! `payload` is the base64url session token, encrypted under the block key
//! first when one is configured. `mac` is HMAC-SHA256 under the current hash
//! key over `name|timestamp|payload`. Rotating the hash key makes every cookie
//! issued before the rotation fail verification.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const HASH_KEY_LEN: usize = 64;
pub const BLOCK_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 24;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CookieError {
    #[error("cookie value malformed")]
    Malformed,

    #[error("cookie signature invalid")]
    InvalidMac,

    #[error("cookie expired")]
    Expired,

    #[error("cookie payload could not be decrypted")]
    Decrypt,

    #[error("cookie payload could not be encrypted")]
    Encrypt,

    #[error("cookie max-age out of range")]
    MaxAgeOutOfRange,
}

/// Signs (and optionally encrypts) session tokens into cookie values.
///
/// The hash key is process-wide and rotatable at runtime; the block key is
/// fixed for the life of the codec.
pub struct CookieCodec {
    hash_key: RwLock<[u8; HASH_KEY_LEN]>,
    block_key: Option<[u8; BLOCK_KEY_LEN]>,
}

impl core::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CookieCodec")
            .field("hash_key", &"<redacted>")
            .field("encrypted", &self.block_key.is_some())
            .finish()
    }
}

fn random_hash_key() -> [u8; HASH_KEY_LEN] {
    let mut key = [0u8; HASH_KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

impl CookieCodec {
    /// A codec with a fresh random hash key.
    pub fn new(block_key: Option<[u8; BLOCK_KEY_LEN]>) -> Self {
        Self::with_hash_key(random_hash_key(), block_key)
    }

    pub fn with_hash_key(hash_key: [u8; HASH_KEY_LEN], block_key: Option<[u8; BLOCK_KEY_LEN]>) -> Self {
        Self {
            hash_key: RwLock::new(hash_key),
            block_key,
        }
    }

    /// Replace the hash key. Irreversible: every outstanding cookie stops
    /// verifying.
    pub fn rotate(&self) {
        *self.hash_key.write() = random_hash_key();
    }

    fn mac(&self, name: &str, timestamp: &[u8], payload: &[u8]) -> Vec<u8> {
        let key = self.hash_key.read();
        let mut mac = match <HmacSha256 as Mac>::new_from_slice(&key[..]) {
            Ok(m) => m,
            Err(_) => unreachable!("hmac key length is unrestricted"),
        };
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp);
        mac.update(b"|");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    fn seal(&self, token: &str) -> Result<Vec<u8>, CookieError> {
        let Some(block_key) = &self.block_key else {
            return Ok(URL_SAFE_NO_PAD.encode(token).into_bytes());
        };

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = XChaCha20Poly1305::new(Key::from_slice(block_key))
            .encrypt(XNonce::from_slice(&nonce), token.as_bytes())
            .map_err(|_| CookieError::Encrypt)?;

        let mut body = nonce.to_vec();
        body.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(body).into_bytes())
    }

    fn open(&self, payload: &[u8]) -> Result<String, CookieError> {
        let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| CookieError::Malformed)?;

        let plaintext = match &self.block_key {
            None => raw,
            Some(block_key) => {
                if raw.len() < NONCE_LEN {
                    return Err(CookieError::Decrypt);
                }
                let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
                XChaCha20Poly1305::new(Key::from_slice(block_key))
                    .decrypt(XNonce::from_slice(nonce), ciphertext)
                    .map_err(|_| CookieError::Decrypt)?
            }
        };

        String::from_utf8(plaintext).map_err(|_| CookieError::Malformed)
    }

    pub fn encode(&self, name: &str, token: &str) -> Result<String, CookieError> {
        self.encode_at(name, token, Utc::now())
    }

    pub fn encode_at(&self, name: &str, token: &str, now: DateTime<Utc>) -> Result<String, CookieError> {
        let timestamp = now.timestamp().to_string();
        let payload = self.seal(token)?;
        let mac = self.mac(name, timestamp.as_bytes(), &payload);

        let mut value = Vec::with_capacity(timestamp.len() + payload.len() + mac.len() + 2);
        value.extend_from_slice(timestamp.as_bytes());
        value.push(b'|');
        value.extend_from_slice(&payload);
        value.push(b'|');
        value.extend_from_slice(&mac);

        Ok(URL_SAFE_NO_PAD.encode(value))
    }

    pub fn decode(&self, name: &str, value: &str, max_age: Duration) -> Result<String, CookieError> {
        self.decode_at(name, value, max_age, Utc::now())
    }

    /// Verify the MAC, then the age, then unwrap the token.
    pub fn decode_at(
        &self,
        name: &str,
        value: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, CookieError> {
        let raw = URL_SAFE_NO_PAD
            .decode(value.trim())
            .map_err(|_| CookieError::Malformed)?;

        // The MAC is raw bytes and may itself contain '|'.
        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(payload), Some(provided)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CookieError::Malformed);
        };

        let expected = self.mac(name, timestamp, payload);
        if !bool::from(expected.ct_eq(provided)) {
            return Err(CookieError::InvalidMac);
        }

        let issued_at: i64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(CookieError::Malformed)?;
        let oldest = now.checked_sub_signed(max_age).ok_or(CookieError::MaxAgeOutOfRange)?;
        if issued_at < oldest.timestamp() {
            return Err(CookieError::Expired);
        }

        self.open(payload)
    }
}

/// Attributes of the session cookie as sent to browsers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub name: String,
    pub domain: Option<String>,
    pub secure: bool,
}

impl CookieOptions {
    /// `Set-Cookie` header value carrying `value` for `max_age`.
    pub fn set_header(&self, value: &str, max_age: Duration) -> String {
        let mut header = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.name,
            value,
            max_age.num_seconds().max(0)
        );
        if let Some(domain) = &self.domain {
            header.push_str("; Domain=");
            header.push_str(domain);
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header
    }

    /// `Set-Cookie` header value that makes the client drop the cookie.
    pub fn clear_header(&self) -> String {
        self.set_header("", Duration::zero())
    }
}

/// Value of cookie `name` within a `Cookie` request header.
pub fn find_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NAME: &str = "warden_session";

    fn day() -> Duration {
        Duration::days(1)
    }

    #[test]
    fn decodes_what_it_encodes() {
        let codec = CookieCodec::new(None);
        let value = codec.encode(NAME, "tok-123").unwrap();
        assert_eq!(codec.decode(NAME, &value, day()).unwrap(), "tok-123");
    }

    #[test]
    fn encrypted_cookies_hide_the_token() {
        let codec = CookieCodec::new(Some([7u8; BLOCK_KEY_LEN]));
        let value = codec.encode(NAME, "tok-123").unwrap();

        let raw = URL_SAFE_NO_PAD.decode(&value).unwrap();
        let plain_payload = URL_SAFE_NO_PAD.encode("tok-123");
        assert!(!String::from_utf8_lossy(&raw).contains(&plain_payload));

        assert_eq!(codec.decode(NAME, &value, day()).unwrap(), "tok-123");
    }

    #[test]
    fn rotation_invalidates_outstanding_cookies() {
        let codec = CookieCodec::new(None);
        let before = codec.encode(NAME, "tok").unwrap();

        codec.rotate();

        assert_eq!(codec.decode(NAME, &before, day()), Err(CookieError::InvalidMac));
        let after = codec.encode(NAME, "tok").unwrap();
        assert_eq!(codec.decode(NAME, &after, day()).unwrap(), "tok");
    }

    #[test]
    fn cookie_is_bound_to_its_name() {
        let codec = CookieCodec::new(None);
        let value = codec.encode(NAME, "tok").unwrap();
        assert_eq!(codec.decode("other", &value, day()), Err(CookieError::InvalidMac));
    }

    #[test]
    fn old_cookies_expire() {
        let codec = CookieCodec::new(None);
        let now = Utc::now();
        let value = codec.encode_at(NAME, "tok", now - Duration::days(2)).unwrap();
        assert_eq!(codec.decode_at(NAME, &value, day(), now), Err(CookieError::Expired));
    }

    #[test]
    fn oversized_max_age_is_an_error_not_a_panic() {
        let codec = CookieCodec::new(None);
        let value = codec.encode(NAME, "tok").unwrap();
        assert_eq!(
            codec.decode(NAME, &value, Duration::MAX),
            Err(CookieError::MaxAgeOutOfRange)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = CookieCodec::new(None);
        assert_eq!(codec.decode(NAME, "!!!", day()), Err(CookieError::Malformed));
        let no_separators = URL_SAFE_NO_PAD.encode("justonefield");
        assert_eq!(codec.decode(NAME, &no_separators, day()), Err(CookieError::Malformed));
    }

    #[test]
    fn set_cookie_attributes() {
        let opts = CookieOptions {
            name: NAME.into(),
            domain: Some("example.com".into()),
            secure: true,
        };
        let header = opts.set_header("abc", Duration::hours(1));
        assert_eq!(
            header,
            "warden_session=abc; Path=/; Max-Age=3600; HttpOnly; SameSite=Lax; Domain=example.com; Secure"
        );
        assert!(opts.clear_header().starts_with("warden_session=; Path=/; Max-Age=0;"));
    }

    #[test]
    fn finds_cookie_among_others() {
        let header = "a=1; warden_session=xyz; b=2";
        assert_eq!(find_cookie(header, NAME), Some("xyz"));
        assert_eq!(find_cookie(header, "c"), None);
    }

    proptest! {
        #[test]
        fn any_single_byte_flip_is_rejected(idx in 0usize..64, token in "[a-zA-Z0-9_-]{8,40}") {
            let codec = CookieCodec::new(None);
            let value = codec.encode(NAME, &token).unwrap();
            let mut raw = URL_SAFE_NO_PAD.decode(&value).unwrap();
            let i = idx % raw.len();
            raw[i] ^= 0x01;
            let tampered = URL_SAFE_NO_PAD.encode(raw);
            prop_assert!(codec.decode(NAME, &tampered, day()).is_err());
        }
    }
}
