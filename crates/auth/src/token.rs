//! Stateless bearer tokens.
//!
//! Wire format: `v2.local.` followed by base64url(nonce || ciphertext), where
//! the ciphertext is XChaCha20-Poly1305 over the JSON [`TokenClaims`] with the
//! header string as associated data. Nothing is stored server-side; a token is
//! trusted exactly as long as it decrypts and has not expired.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use uuid::Uuid;

use crate::claims::{TokenClaims, TokenValidationError, validate_claims};
use crate::{ApiClient, SessionContextData};

pub const TOKEN_HEADER: &str = "v2.local.";

const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;

/// Tokens never live longer than this, whatever lifetime is requested.
pub fn hard_maximum_lifetime() -> Duration {
    Duration::minutes(10)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token invalid")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("token not yet valid")]
    TokenNotYetValid,

    #[error("token payload corrupt")]
    PayloadCorrupt,

    #[error("token could not be built: {0}")]
    Build(String),
}

impl From<TokenValidationError> for TokenError {
    fn from(value: TokenValidationError) -> Self {
        match value {
            TokenValidationError::Expired => TokenError::TokenExpired,
            TokenValidationError::NotYetValid => TokenError::TokenNotYetValid,
            TokenValidationError::InvalidTimeWindow => TokenError::TokenInvalid,
        }
    }
}

/// 32-byte symmetric key for local-mode tokens.
#[derive(Clone)]
pub struct LocalKey([u8; 32]);

impl LocalKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    fn cipher(&self) -> XChaCha20Poly1305 {
        XChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl core::fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("LocalKey(<redacted>)")
    }
}

/// An issued token and the instant it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and verifies stateless tokens under one process-wide key.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: LocalKey,
    issuer: String,
    default_lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(key: LocalKey, issuer: impl Into<String>, default_lifetime: Duration) -> Self {
        Self {
            key,
            issuer: issuer.into(),
            default_lifetime,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `min(requested or default, hard maximum)`; non-positive requests fall back
    /// to the default.
    pub fn effective_lifetime(&self, requested: Option<Duration>) -> Duration {
        let wanted = requested
            .filter(|d| *d > Duration::zero())
            .unwrap_or(self.default_lifetime);
        wanted.min(hard_maximum_lifetime())
    }

    pub fn issue(
        &self,
        session: &SessionContextData,
        client: &ApiClient,
        requested_lifetime: Option<Duration>,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(session, client, requested_lifetime, Utc::now())
    }

    pub fn issue_at(
        &self,
        session: &SessionContextData,
        client: &ApiClient,
        requested_lifetime: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let snapshot = session
            .to_bytes()
            .map_err(|e| TokenError::Build(format!("serializing session context: {e}")))?;

        let claims = TokenClaims {
            iss: self.issuer.clone(),
            sub: client.owner,
            aud: client.owner.to_string(),
            jti: Uuid::now_v7(),
            iat: now,
            nbf: now,
            exp: now + self.effective_lifetime(requested_lifetime),
            data: URL_SAFE_NO_PAD.encode(snapshot),
        };

        let token = self.seal(&claims)?;
        Ok(IssuedToken {
            token,
            expires_at: claims.exp,
        })
    }

    fn seal(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        let plaintext = serde_json::to_vec(claims)
            .map_err(|e| TokenError::Build(format!("serializing claims: {e}")))?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .key
            .cipher()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: &plaintext,
                    aad: TOKEN_HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::Build("encryption failed".to_string()))?;

        let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        body.extend_from_slice(&nonce);
        body.extend_from_slice(&ciphertext);

        Ok(format!("{TOKEN_HEADER}{}", URL_SAFE_NO_PAD.encode(body)))
    }

    /// Decrypt and authenticate, without looking at the time claims.
    pub fn open(&self, raw: &str) -> Result<TokenClaims, TokenError> {
        let encoded = raw.trim().strip_prefix(TOKEN_HEADER).ok_or(TokenError::TokenInvalid)?;
        let body = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| TokenError::TokenInvalid)?;

        if body.len() < NONCE_LEN + TAG_LEN {
            return Err(TokenError::TokenInvalid);
        }
        let (nonce, ciphertext) = body.split_at(NONCE_LEN);

        let plaintext = self
            .key
            .cipher()
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: TOKEN_HEADER.as_bytes(),
                },
            )
            .map_err(|_| TokenError::TokenInvalid)?;

        serde_json::from_slice(&plaintext).map_err(|_| TokenError::TokenInvalid)
    }

    pub fn verify(&self, raw: &str) -> Result<SessionContextData, TokenError> {
        self.verify_at(raw, Utc::now())
    }

    /// Decrypt, check expiry, decode the embedded snapshot. No lookups.
    pub fn verify_at(&self, raw: &str, now: DateTime<Utc>) -> Result<SessionContextData, TokenError> {
        let claims = self.open(raw)?;
        validate_claims(&claims, now)?;

        let snapshot = URL_SAFE_NO_PAD
            .decode(claims.data.as_bytes())
            .map_err(|_| TokenError::PayloadCorrupt)?;

        SessionContextData::from_bytes(&snapshot).map_err(|_| TokenError::PayloadCorrupt)
    }

    #[cfg(test)]
    pub(crate) fn seal_for_test(&self, claims: &TokenClaims) -> String {
        self.seal(claims).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::fixtures::two_account_context;
    use warden_core::AccountId;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(LocalKey::generate(), "warden-test", Duration::minutes(5))
    }

    fn client(session: &SessionContextData) -> ApiClient {
        ApiClient {
            name: "ci".into(),
            client_id: "client-1".into(),
            client_secret: b"secret".to_vec(),
            owner: session.user_id(),
        }
    }

    #[test]
    fn verify_returns_the_issued_snapshot() {
        let issuer = issuer();
        let session = two_account_context(AccountId::new(), AccountId::new());

        let issued = issuer.issue(&session, &client(&session), None).unwrap();
        assert!(issued.token.starts_with(TOKEN_HEADER));

        let verified = issuer.verify(&issued.token).unwrap();
        assert_eq!(verified, session);
    }

    #[test]
    fn claims_bind_subject_to_client_owner() {
        let issuer = issuer();
        let session = two_account_context(AccountId::new(), AccountId::new());
        let c = client(&session);

        let issued = issuer.issue(&session, &c, None).unwrap();
        let claims = issuer.open(&issued.token).unwrap();

        assert_eq!(claims.sub, c.owner);
        assert_eq!(claims.aud, c.owner.to_string());
        assert_eq!(claims.iss, "warden-test");
        assert_eq!(claims.nbf, claims.iat);
        assert_eq!(claims.exp, issued.expires_at);
    }

    #[test]
    fn lifetime_is_capped_at_hard_maximum() {
        let issuer = issuer();
        let session = two_account_context(AccountId::new(), AccountId::new());
        let now = Utc::now();

        let issued = issuer
            .issue_at(&session, &client(&session), Some(hard_maximum_lifetime() * 100), now)
            .unwrap();

        assert_eq!(issued.expires_at, now + hard_maximum_lifetime());
    }

    #[test]
    fn shorter_requests_are_honoured_and_nonsense_falls_back() {
        let issuer = issuer();
        assert_eq!(issuer.effective_lifetime(Some(Duration::seconds(30))), Duration::seconds(30));
        assert_eq!(issuer.effective_lifetime(Some(Duration::seconds(-5))), Duration::minutes(5));
        assert_eq!(issuer.effective_lifetime(None), Duration::minutes(5));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer();
        let session = two_account_context(AccountId::new(), AccountId::new());
        let past = Utc::now() - Duration::hours(24);

        let issued = issuer.issue_at(&session, &client(&session), Some(Duration::minutes(1)), past).unwrap();
        assert_eq!(issuer.verify(&issued.token), Err(TokenError::TokenExpired));
    }

    #[test]
    fn wrong_key_garbage_and_foreign_header_are_invalid() {
        let session = two_account_context(AccountId::new(), AccountId::new());
        let issued = issuer().issue(&session, &client(&session), None).unwrap();

        let other = issuer();
        assert_eq!(other.verify(&issued.token), Err(TokenError::TokenInvalid));
        assert_eq!(other.verify("blah"), Err(TokenError::TokenInvalid));

        let foreign = issued.token.replacen("v2.local.", "v2.public.", 1);
        assert_eq!(other.verify(&foreign), Err(TokenError::TokenInvalid));
    }

    #[test]
    fn tampered_ciphertext_is_invalid() {
        let issuer = issuer();
        let session = two_account_context(AccountId::new(), AccountId::new());
        let issued = issuer.issue(&session, &client(&session), None).unwrap();

        let mut chars: Vec<char> = issued.token.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert_eq!(issuer.verify(&tampered), Err(TokenError::TokenInvalid));
    }

    #[test]
    fn undecodable_snapshot_is_payload_corrupt() {
        let issuer = issuer();
        let now = Utc::now();
        let mut claims = TokenClaims {
            iss: "warden-test".into(),
            sub: warden_core::UserId::new(),
            aud: String::new(),
            jti: Uuid::now_v7(),
            iat: now,
            nbf: now,
            exp: now + Duration::hours(1),
            data: r"       \\\\\\\\               lololo".into(),
        };
        let bad_base64 = issuer.seal_for_test(&claims);
        assert_eq!(issuer.verify(&bad_base64), Err(TokenError::PayloadCorrupt));

        claims.data = URL_SAFE_NO_PAD.encode(b"blah");
        let bad_snapshot = issuer.seal_for_test(&claims);
        assert_eq!(issuer.verify(&bad_snapshot), Err(TokenError::PayloadCorrupt));
    }
}
