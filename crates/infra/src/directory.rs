use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use warden_auth::{
    AccountMembershipInfo, AccountMembershipManager, DirectoryError, Reputation, RequesterInfo, Role,
    SessionContextData, User, UserLookup,
};
use warden_core::{AccountId, UserId};

#[derive(Debug, Clone)]
struct Membership {
    user_id: UserId,
    account_id: AccountId,
    role: Role,
    default: bool,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<UserId, User>,
    accounts: HashMap<AccountId, String>,
    memberships: Vec<Membership>,
}

/// In-memory users, accounts and memberships for tests/dev.
///
/// Reads always reflect the latest writes, so a membership revoked here is
/// visible to the next cookie-authenticated request.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    inner: RwLock<Inner>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, user: User) {
        self.inner.write().users.insert(user.id, user);
    }

    pub fn set_reputation(&self, user_id: UserId, reputation: Reputation, explanation: &str) {
        if let Some(user) = self.inner.write().users.get_mut(&user_id) {
            user.reputation = reputation;
            user.reputation_explanation = explanation.to_string();
        }
    }

    pub fn create_account(&self, name: &str) -> AccountId {
        let id = AccountId::new();
        self.inner.write().accounts.insert(id, name.to_string());
        id
    }

    /// Add `user_id` to `account_id`. A default membership clears the user's
    /// previous default.
    pub fn add_membership(&self, user_id: UserId, account_id: AccountId, role: Role, default: bool) {
        let mut inner = self.inner.write();
        if default {
            for m in inner.memberships.iter_mut().filter(|m| m.user_id == user_id) {
                m.default = false;
            }
        }
        inner
            .memberships
            .retain(|m| !(m.user_id == user_id && m.account_id == account_id));
        inner.memberships.push(Membership {
            user_id,
            account_id,
            role,
            default,
        });
    }

    pub fn remove_membership(&self, user_id: UserId, account_id: AccountId) {
        self.inner
            .write()
            .memberships
            .retain(|m| !(m.user_id == user_id && m.account_id == account_id));
    }
}

impl Inner {
    /// The flagged default, else the oldest remaining membership.
    fn default_account_for(&self, user_id: UserId) -> Option<AccountId> {
        let mut owned = self.memberships.iter().filter(|m| m.user_id == user_id);
        let first = owned.clone().next().map(|m| m.account_id);
        owned.find(|m| m.default).map(|m| m.account_id).or(first)
    }
}

#[async_trait]
impl UserLookup for InMemoryDirectory {
    async fn get_user_by_username(&self, username: &str) -> Result<User, DirectoryError> {
        self.inner
            .read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, DirectoryError> {
        self.inner
            .read()
            .users
            .get(&user_id)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }
}

#[async_trait]
impl AccountMembershipManager for InMemoryDirectory {
    async fn build_session_context_data_for_user(
        &self,
        user_id: UserId,
    ) -> Result<SessionContextData, DirectoryError> {
        let inner = self.inner.read();
        let user = inner.users.get(&user_id).ok_or(DirectoryError::NotFound)?;

        let mut memberships = BTreeMap::new();
        for m in inner.memberships.iter().filter(|m| m.user_id == user_id) {
            let account_name = inner.accounts.get(&m.account_id).cloned().unwrap_or_default();
            memberships
                .entry(m.account_id)
                .or_insert_with(|| AccountMembershipInfo {
                    account_name,
                    account_roles: Vec::new(),
                })
                .account_roles
                .push(m.role);
        }

        let active = inner.default_account_for(user_id).ok_or(DirectoryError::NotFound)?;
        let requester = RequesterInfo {
            user_id: user.id,
            reputation: user.reputation,
            reputation_explanation: user.reputation_explanation.clone(),
            service_roles: user.service_roles.clone(),
            requires_password_change: user.requires_password_change,
        };

        SessionContextData::new(requester, active, memberships)
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))
    }

    async fn get_default_account_id_for_user(&self, user_id: UserId) -> Result<AccountId, DirectoryError> {
        self.inner
            .read()
            .default_account_for(user_id)
            .ok_or(DirectoryError::NotFound)
    }

    async fn user_is_member_of_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<bool, DirectoryError> {
        Ok(self
            .inner
            .read()
            .memberships
            .iter()
            .any(|m| m.user_id == user_id && m.account_id == account_id))
    }
}
