use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use warden_core::UserId;

/// Claims carried inside an encrypted stateless token.
///
/// `data` is the base64url-encoded serialized [`crate::SessionContextData`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer identity.
    pub iss: String,

    /// Subject: the API client owner's user ID.
    pub sub: UserId,

    /// Audience: same user as `sub`, in string form.
    pub aud: String,

    /// Unique token ID.
    pub jti: Uuid,

    pub iat: DateTime<Utc>,
    pub nbf: DateTime<Utc>,
    pub exp: DateTime<Utc>,

    pub data: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

/// Deterministically validate the time claims.
///
/// A token is still valid at the exact instant of `exp`; it expires once
/// `now` is strictly past it.
pub fn validate_claims(claims: &TokenClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now > claims.exp {
        return Err(TokenValidationError::Expired);
    }
    if now < claims.nbf {
        return Err(TokenValidationError::NotYetValid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn claims(iat: DateTime<Utc>, lifetime: Duration) -> TokenClaims {
        TokenClaims {
            iss: "test".into(),
            sub: UserId::new(),
            aud: String::new(),
            jti: Uuid::now_v7(),
            iat,
            nbf: iat,
            exp: iat + lifetime,
            data: String::new(),
        }
    }

    #[test]
    fn valid_inside_window() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims(now, Duration::minutes(5)), now), Ok(()));
    }

    #[test]
    fn valid_at_expiry_instant_expired_after() {
        let now = Utc::now();
        let c = claims(now, Duration::minutes(5));
        assert_eq!(validate_claims(&c, c.exp), Ok(()));
        assert_eq!(
            validate_claims(&c, c.exp + Duration::milliseconds(1)),
            Err(TokenValidationError::Expired)
        );
    }

    #[test]
    fn rejects_future_and_inverted_windows() {
        let now = Utc::now();
        assert_eq!(
            validate_claims(&claims(now + Duration::minutes(1), Duration::minutes(5)), now),
            Err(TokenValidationError::NotYetValid)
        );
        assert_eq!(
            validate_claims(&claims(now, Duration::zero()), now),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
