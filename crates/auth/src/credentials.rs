use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticatorError {
    #[error("password does not match")]
    PasswordDoesNotMatch,

    #[error("invalid TOTP token")]
    InvalidTotpToken,

    #[error("credential backend failure: {0}")]
    Backend(String),
}

/// Password + second-factor verification capability.
///
/// Hashing internals are the implementor's business; this crate only needs a
/// yes/no answer and a way to tell a bad password from a bad TOTP code.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn validate_login(
        &self,
        hashed_password: &str,
        provided_password: &str,
        totp_secret: &str,
        totp_code: &str,
    ) -> Result<bool, AuthenticatorError>;

    async fn hash_password(&self, password: &str) -> Result<String, AuthenticatorError>;
}
