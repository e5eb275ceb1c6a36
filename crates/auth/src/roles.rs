use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role identifier used for RBAC.
///
/// Service roles are held by a user independent of any account; account roles
/// are held per account membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    ServiceAdmin,
    ServiceUser,
    AccountAdmin,
    AccountMember,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 4] = [
        Role::ServiceAdmin,
        Role::ServiceUser,
        Role::AccountAdmin,
        Role::AccountMember,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ServiceAdmin => "service_admin",
            Role::ServiceUser => "service_user",
            Role::AccountAdmin => "account_admin",
            Role::AccountMember => "account_member",
        }
    }

    pub fn is_service_role(&self) -> bool {
        matches!(self, Role::ServiceAdmin | Role::ServiceUser)
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_matches_display() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_an_error() {
        assert_eq!("root".parse::<Role>(), Err(UnknownRole("root".into())));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Role::AccountAdmin).unwrap();
        assert_eq!(json, "\"account_admin\"");
    }
}
