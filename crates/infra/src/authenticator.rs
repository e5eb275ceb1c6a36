//! bcrypt passwords + RFC 6238 TOTP second factor.
//!
//! TOTP secrets are stored hex-encoded. Codes are six digits over a 30-second
//! step; one step of clock skew is tolerated either way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;

use warden_auth::{Authenticator, AuthenticatorError};

type HmacSha1 = Hmac<Sha1>;

const TOTP_STEP_SECS: i64 = 30;
const TOTP_DIGITS: u32 = 6;
const TOTP_SKEW_STEPS: i64 = 1;

/// HOTP value for `counter` (RFC 4226 dynamic truncation).
fn hotp(secret: &[u8], counter: u64) -> u32 {
    let mut mac = match HmacSha1::new_from_slice(secret) {
        Ok(m) => m,
        Err(_) => unreachable!("hmac key length is unrestricted"),
    };
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = u32::from_be_bytes([
        digest[offset] & 0x7f,
        digest[offset + 1],
        digest[offset + 2],
        digest[offset + 3],
    ]);
    binary % 10u32.pow(TOTP_DIGITS)
}

fn format_code(code: u32) -> String {
    format!("{code:0width$}", width = TOTP_DIGITS as usize)
}

fn step_at(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(TOTP_STEP_SECS)
}

/// The code an authenticator app would show for `secret_hex` at `at`.
pub fn totp_code(secret_hex: &str, at: DateTime<Utc>) -> Result<String, AuthenticatorError> {
    let secret = hex::decode(secret_hex.trim())
        .map_err(|e| AuthenticatorError::Backend(format!("decoding totp secret: {e}")))?;
    Ok(format_code(hotp(&secret, step_at(at) as u64)))
}

/// Checks `code` against the steps around `at`.
pub fn verify_totp(secret_hex: &str, code: &str, at: DateTime<Utc>) -> Result<bool, AuthenticatorError> {
    let secret = hex::decode(secret_hex.trim())
        .map_err(|e| AuthenticatorError::Backend(format!("decoding totp secret: {e}")))?;
    let code = code.trim();
    if code.len() != TOTP_DIGITS as usize {
        return Ok(false);
    }

    let step = step_at(at);
    let matched = (-TOTP_SKEW_STEPS..=TOTP_SKEW_STEPS)
        .filter_map(|skew| u64::try_from(step + skew).ok())
        .map(|counter| format_code(hotp(&secret, counter)))
        .fold(false, |acc, expected| acc | bool::from(expected.as_bytes().ct_eq(code.as_bytes())));

    Ok(matched)
}

#[derive(Debug, Clone)]
pub struct BcryptTotpAuthenticator {
    cost: u32,
}

impl Default for BcryptTotpAuthenticator {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl BcryptTotpAuthenticator {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

#[async_trait]
impl Authenticator for BcryptTotpAuthenticator {
    async fn validate_login(
        &self,
        hashed_password: &str,
        provided_password: &str,
        totp_secret: &str,
        totp_code: &str,
    ) -> Result<bool, AuthenticatorError> {
        let hashed = hashed_password.to_string();
        let provided = provided_password.to_string();
        let password_ok = tokio::task::spawn_blocking(move || bcrypt::verify(provided, &hashed))
            .await
            .map_err(|e| AuthenticatorError::Backend(format!("password check task: {e}")))?
            .map_err(|e| AuthenticatorError::Backend(format!("verifying password: {e}")))?;

        if !password_ok {
            return Err(AuthenticatorError::PasswordDoesNotMatch);
        }
        if !verify_totp(totp_secret, totp_code, Utc::now())? {
            return Err(AuthenticatorError::InvalidTotpToken);
        }
        Ok(true)
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthenticatorError> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthenticatorError::Backend(format!("hashing task: {e}")))?
            .map_err(|e| AuthenticatorError::Backend(format!("hashing password: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    // RFC 6238 appendix B, SHA-1 seed "12345678901234567890".
    const RFC_SECRET: &str = "3132333435363738393031323334353637383930";

    #[test]
    fn matches_rfc_6238_vectors() {
        let cases = [
            (59, "287082"),
            (1_111_111_109, "081804"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
        ];
        for (secs, expected) in cases {
            let at = DateTime::from_timestamp(secs, 0).unwrap();
            assert_eq!(totp_code(RFC_SECRET, at).unwrap(), expected, "t={secs}");
        }
    }

    #[test]
    fn one_step_of_skew_is_tolerated() {
        let at = DateTime::from_timestamp(1_234_567_890, 0).unwrap();
        let previous = totp_code(RFC_SECRET, at - Duration::seconds(30)).unwrap();
        let next = totp_code(RFC_SECRET, at + Duration::seconds(30)).unwrap();

        assert!(verify_totp(RFC_SECRET, &previous, at).unwrap());
        assert!(verify_totp(RFC_SECRET, &next, at).unwrap());
        assert!(!verify_totp(RFC_SECRET, "287082", at).unwrap());
    }

    proptest! {
        #[test]
        fn current_code_always_verifies(secs in 0i64..4_000_000_000) {
            let at = DateTime::from_timestamp(secs, 0).unwrap();
            let code = totp_code(RFC_SECRET, at).unwrap();
            prop_assert_eq!(code.len(), 6);
            prop_assert!(verify_totp(RFC_SECRET, &code, at).unwrap());
        }
    }

    #[test]
    fn wrong_length_codes_never_match() {
        assert!(!verify_totp(RFC_SECRET, "12345", Utc::now()).unwrap());
        assert!(!verify_totp(RFC_SECRET, "", Utc::now()).unwrap());
    }

    #[tokio::test]
    async fn distinguishes_bad_password_from_bad_totp() {
        let auth = BcryptTotpAuthenticator::new(4);
        let hashed = auth.hash_password("correct horse").await.unwrap();
        let code = totp_code(RFC_SECRET, Utc::now()).unwrap();

        assert_eq!(auth.validate_login(&hashed, "correct horse", RFC_SECRET, &code).await, Ok(true));
        assert_eq!(
            auth.validate_login(&hashed, "wrong", RFC_SECRET, &code).await,
            Err(AuthenticatorError::PasswordDoesNotMatch)
        );

        let bad_code = if code == "000000" { "111111" } else { "000000" };
        let result = auth.validate_login(&hashed, "correct horse", RFC_SECRET, bad_code).await;
        // A random six-digit code could be valid for an adjacent step.
        if !verify_totp(RFC_SECRET, bad_code, Utc::now()).unwrap() {
            assert_eq!(result, Err(AuthenticatorError::InvalidTotpToken));
        }
    }
}
