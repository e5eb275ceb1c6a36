//! Lookup interfaces this crate consumes but does not implement.
//!
//! Storage lives elsewhere; the service only ever sees these traits.

use async_trait::async_trait;
use thiserror::Error;

use warden_core::{AccountId, UserId};

use crate::{Reputation, Role, SessionContextData};

/// A stored user, as far as authentication cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub hashed_password: String,
    pub two_factor_secret: String,
    pub reputation: Reputation,
    pub reputation_explanation: String,
    pub service_roles: Vec<Role>,
    pub requires_password_change: bool,
}

impl User {
    pub fn is_banned(&self) -> bool {
        self.reputation.is_banned()
    }
}

/// Registered machine client allowed to request stateless tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiClient {
    pub name: String,
    pub client_id: String,
    pub client_secret: Vec<u8>,
    pub owner: UserId,
}

impl core::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiClient")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("owner", &self.owner)
            .finish()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("not found")]
    NotFound,

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn get_user_by_username(&self, username: &str) -> Result<User, DirectoryError>;

    async fn get_user(&self, user_id: UserId) -> Result<User, DirectoryError>;
}

#[async_trait]
pub trait AccountMembershipManager: Send + Sync {
    /// Live snapshot of the user's memberships, active in their default account.
    async fn build_session_context_data_for_user(
        &self,
        user_id: UserId,
    ) -> Result<SessionContextData, DirectoryError>;

    async fn get_default_account_id_for_user(&self, user_id: UserId) -> Result<AccountId, DirectoryError>;

    async fn user_is_member_of_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<bool, DirectoryError>;
}

#[async_trait]
pub trait ApiClientLookup: Send + Sync {
    async fn get_api_client_by_client_id(&self, client_id: &str) -> Result<ApiClient, DirectoryError>;
}
