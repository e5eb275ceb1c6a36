use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{AccountId, UserId};

use crate::{AccountRolePermissionsChecker, PermissionModel, Role, ServiceRolePermissionChecker};

/// Account-independent standing of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Reputation {
    #[default]
    Active,
    Unverified,
    Banned,
    Terminated,
}

impl Reputation {
    pub fn is_banned(&self) -> bool {
        matches!(self, Reputation::Banned)
    }
}

impl core::fmt::Display for Reputation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Reputation::Active => write!(f, "active"),
            Reputation::Unverified => write!(f, "unverified"),
            Reputation::Banned => write!(f, "banned"),
            Reputation::Terminated => write!(f, "terminated"),
        }
    }
}

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterInfo {
    pub user_id: UserId,
    pub reputation: Reputation,
    pub reputation_explanation: String,
    pub service_roles: Vec<Role>,
    pub requires_password_change: bool,
}

/// A user's standing within one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMembershipInfo {
    pub account_name: String,
    pub account_roles: Vec<Role>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionContextError {
    #[error("active account ID required for session context data")]
    MissingActiveAccount,
}

/// Authorization snapshot attached to a request.
///
/// Built fresh from storage for cookie-authenticated requests, or carried
/// wholesale inside a stateless token. `active_account_id` is expected to be a
/// key of `account_memberships`; callers that find otherwise must reject the
/// request (see [`crate::authorize_request`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContextData {
    pub requester: RequesterInfo,
    pub active_account_id: AccountId,
    pub account_memberships: BTreeMap<AccountId, AccountMembershipInfo>,
}

impl SessionContextData {
    pub fn new(
        requester: RequesterInfo,
        active_account_id: AccountId,
        account_memberships: BTreeMap<AccountId, AccountMembershipInfo>,
    ) -> Result<Self, SessionContextError> {
        if active_account_id.is_nil() {
            return Err(SessionContextError::MissingActiveAccount);
        }

        Ok(Self {
            requester,
            active_account_id,
            account_memberships,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.requester.user_id
    }

    pub fn is_member_of(&self, account_id: AccountId) -> bool {
        self.account_memberships.contains_key(&account_id)
    }

    pub fn active_account_is_authorized(&self) -> bool {
        self.is_member_of(self.active_account_id)
    }

    pub fn service_permissions<'a>(&'a self, model: &'a PermissionModel) -> ServiceRolePermissionChecker<'a> {
        model.service_checker(&self.requester.service_roles)
    }

    /// Role checker for `account_id`, or `None` when the user is not a member.
    pub fn account_permissions<'a>(
        &'a self,
        model: &'a PermissionModel,
        account_id: AccountId,
    ) -> Option<AccountRolePermissionsChecker<'a>> {
        self.account_memberships
            .get(&account_id)
            .map(|m| model.account_checker(&m.account_roles))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn requester(roles: Vec<Role>) -> RequesterInfo {
        RequesterInfo {
            user_id: UserId::new(),
            reputation: Reputation::Active,
            reputation_explanation: String::new(),
            service_roles: roles,
            requires_password_change: false,
        }
    }

    pub fn membership(name: &str, role: Role) -> AccountMembershipInfo {
        AccountMembershipInfo {
            account_name: name.to_string(),
            account_roles: vec![role],
        }
    }

    /// A user active in `a` as a member who is also an admin of `b`.
    pub fn two_account_context(a: AccountId, b: AccountId) -> SessionContextData {
        let mut memberships = BTreeMap::new();
        memberships.insert(a, membership("alpha", Role::AccountMember));
        memberships.insert(b, membership("beta", Role::AccountAdmin));
        SessionContextData::new(requester(vec![Role::ServiceUser]), a, memberships).unwrap()
    }
}
