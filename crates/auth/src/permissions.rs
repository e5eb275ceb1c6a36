use serde::{Deserialize, Serialize};

/// Atomic permission.
///
/// The set is closed and known at compile time; roles map onto subsets of it
/// through [`crate::PermissionModel`]. The string form (e.g. `"update.account"`)
/// is what appears in logs and serialized snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    // account management
    #[serde(rename = "update.account")]
    UpdateAccount,
    #[serde(rename = "archive.account")]
    ArchiveAccount,
    #[serde(rename = "add.member.account")]
    AddMember,
    #[serde(rename = "remove.member.account")]
    RemoveMember,
    #[serde(rename = "update.member_permissions.account")]
    ModifyMemberPermissions,
    #[serde(rename = "transfer.account")]
    TransferAccount,
    #[serde(rename = "read.audit_log_entries")]
    ReadAuditLogEntries,

    // webhooks
    #[serde(rename = "create.webhooks")]
    CreateWebhooks,
    #[serde(rename = "read.webhooks")]
    ReadWebhooks,
    #[serde(rename = "update.webhooks")]
    UpdateWebhooks,
    #[serde(rename = "archive.webhooks")]
    ArchiveWebhooks,

    // api clients
    #[serde(rename = "create.api_clients")]
    CreateApiClients,
    #[serde(rename = "read.api_clients")]
    ReadApiClients,
    #[serde(rename = "archive.api_clients")]
    ArchiveApiClients,

    // items
    #[serde(rename = "create.items")]
    CreateItems,
    #[serde(rename = "read.items")]
    ReadItems,
    #[serde(rename = "search.items")]
    SearchItems,
    #[serde(rename = "update.items")]
    UpdateItems,
    #[serde(rename = "archive.items")]
    ArchiveItems,

    // service level
    #[serde(rename = "cycle.cookie_secret")]
    CycleCookieSecret,
    #[serde(rename = "ban.user")]
    BanUser,
    #[serde(rename = "terminate.account")]
    TerminateAccount,
    #[serde(rename = "impersonate.user")]
    ImpersonateUser,
    #[serde(rename = "read.users")]
    ReadUsers,
}

impl Permission {
    pub const ALL: [Permission; 24] = [
        Permission::UpdateAccount,
        Permission::ArchiveAccount,
        Permission::AddMember,
        Permission::RemoveMember,
        Permission::ModifyMemberPermissions,
        Permission::TransferAccount,
        Permission::ReadAuditLogEntries,
        Permission::CreateWebhooks,
        Permission::ReadWebhooks,
        Permission::UpdateWebhooks,
        Permission::ArchiveWebhooks,
        Permission::CreateApiClients,
        Permission::ReadApiClients,
        Permission::ArchiveApiClients,
        Permission::CreateItems,
        Permission::ReadItems,
        Permission::SearchItems,
        Permission::UpdateItems,
        Permission::ArchiveItems,
        Permission::CycleCookieSecret,
        Permission::BanUser,
        Permission::TerminateAccount,
        Permission::ImpersonateUser,
        Permission::ReadUsers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::UpdateAccount => "update.account",
            Permission::ArchiveAccount => "archive.account",
            Permission::AddMember => "add.member.account",
            Permission::RemoveMember => "remove.member.account",
            Permission::ModifyMemberPermissions => "update.member_permissions.account",
            Permission::TransferAccount => "transfer.account",
            Permission::ReadAuditLogEntries => "read.audit_log_entries",
            Permission::CreateWebhooks => "create.webhooks",
            Permission::ReadWebhooks => "read.webhooks",
            Permission::UpdateWebhooks => "update.webhooks",
            Permission::ArchiveWebhooks => "archive.webhooks",
            Permission::CreateApiClients => "create.api_clients",
            Permission::ReadApiClients => "read.api_clients",
            Permission::ArchiveApiClients => "archive.api_clients",
            Permission::CreateItems => "create.items",
            Permission::ReadItems => "read.items",
            Permission::SearchItems => "search.items",
            Permission::UpdateItems => "update.items",
            Permission::ArchiveItems => "archive.items",
            Permission::CycleCookieSecret => "cycle.cookie_secret",
            Permission::BanUser => "ban.user",
            Permission::TerminateAccount => "terminate.account",
            Permission::ImpersonateUser => "impersonate.user",
            Permission::ReadUsers => "read.users",
        }
    }

    /// Look up a permission by its string form. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.as_str() == name)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_and_resolvable() {
        let mut seen = std::collections::HashSet::new();
        for p in Permission::ALL {
            assert!(seen.insert(p.as_str()), "duplicate name {p}");
            assert_eq!(Permission::from_name(p.as_str()), Some(p));
        }
    }

    #[test]
    fn serde_form_matches_display() {
        for p in Permission::ALL {
            let json = serde_json::to_string(&p).unwrap();
            assert_eq!(json, format!("\"{}\"", p.as_str()));
        }
    }

    #[test]
    fn unknown_name_is_none() {
        assert_eq!(Permission::from_name("launch.missiles"), None);
    }
}
