//! Request/response bodies of the auth routes.

use serde::{Deserialize, Serialize};

use warden_auth::{Reputation, Role};
use warden_core::{AccountId, DomainError, UserId};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub totp_token: String,
}

impl LoginRequest {
    pub fn validate(&self, min_username: usize, min_password: usize) -> Result<(), DomainError> {
        if self.username.trim().chars().count() < min_username {
            return Err(DomainError::validation(format!(
                "username must be at least {min_username} characters"
            )));
        }
        if self.password.chars().count() < min_password {
            return Err(DomainError::validation(format!(
                "password must be at least {min_password} characters"
            )));
        }
        let totp = self.totp_token.trim();
        if totp.len() != 6 || !totp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::validation("totpToken must be six digits"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeActiveAccountRequest {
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
}

impl ChangeActiveAccountRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.account_id.is_nil() {
            return Err(DomainError::validation("accountID is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusResponse {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub active_account: Option<AccountId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_reputation: Option<Reputation>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub reputation_explanation: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoamiResponse {
    pub user_id: UserId,
    pub origin: &'static str,
    pub active_account: AccountId,
    pub active_account_name: String,
    pub account_roles: Vec<Role>,
    pub service_roles: Vec<Role>,
    pub requires_password_change: bool,
}
