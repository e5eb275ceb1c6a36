//! Role → permission assignments and the role inheritance chain.
//!
//! A [`PermissionModel`] is built once at process start and handed to every
//! component that makes authorization decisions. It is immutable after
//! construction; there is no global registry.

use std::collections::{BTreeSet, HashMap, HashSet};

use thiserror::Error;

use crate::{Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("role '{0}' registered twice")]
    DuplicateRole(Role),

    #[error("role '{role}' inherits from unregistered role '{parent}'")]
    UnknownParent { role: Role, parent: Role },

    #[error("role inheritance cycle through '{0}'")]
    Cycle(Role),
}

#[derive(Debug, Clone)]
struct RoleDefinition {
    parent: Option<Role>,
    granted: Vec<Permission>,
}

/// Incrementally declares roles before freezing them into a [`PermissionModel`].
#[derive(Debug, Default)]
pub struct PermissionModelBuilder {
    roles: Vec<(Role, RoleDefinition)>,
}

impl PermissionModelBuilder {
    /// Declare `role`, inheriting everything `parent` grants plus `granted`.
    pub fn role(
        mut self,
        role: Role,
        parent: Option<Role>,
        granted: impl IntoIterator<Item = Permission>,
    ) -> Self {
        self.roles.push((
            role,
            RoleDefinition {
                parent,
                granted: granted.into_iter().collect(),
            },
        ));
        self
    }

    /// Validate uniqueness, parent references and acyclicity, then resolve every
    /// role's effective permission set.
    pub fn build(self) -> Result<PermissionModel, ModelError> {
        let mut definitions: HashMap<Role, RoleDefinition> = HashMap::new();
        for (role, def) in self.roles {
            if definitions.insert(role, def).is_some() {
                return Err(ModelError::DuplicateRole(role));
            }
        }

        for (role, def) in &definitions {
            if let Some(parent) = def.parent {
                if !definitions.contains_key(&parent) {
                    return Err(ModelError::UnknownParent {
                        role: *role,
                        parent,
                    });
                }
            }
        }

        let mut effective: HashMap<Role, HashSet<Permission>> = HashMap::new();
        for role in definitions.keys() {
            let mut visited = HashSet::new();
            let mut perms = HashSet::new();
            let mut cursor = Some(*role);

            while let Some(current) = cursor {
                if !visited.insert(current) {
                    return Err(ModelError::Cycle(*role));
                }
                let def = &definitions[&current];
                perms.extend(def.granted.iter().copied());
                cursor = def.parent;
            }

            effective.insert(*role, perms);
        }

        let parents = definitions
            .iter()
            .map(|(role, def)| (*role, def.parent))
            .collect();

        Ok(PermissionModel { effective, parents })
    }
}

/// Immutable RBAC graph.
///
/// `has_permission` uses conjunction: with several roles held at once, every
/// one of them must grant the permission. An empty role set, or any role the
/// model does not know, is a deny.
#[derive(Debug, Clone)]
pub struct PermissionModel {
    effective: HashMap<Role, HashSet<Permission>>,
    parents: HashMap<Role, Option<Role>>,
}

impl PermissionModel {
    pub fn builder() -> PermissionModelBuilder {
        PermissionModelBuilder::default()
    }

    /// The production role set:
    /// `service_admin ⊃ account_admin ⊃ account_member`, with `service_user`
    /// standing alone.
    pub fn standard() -> Self {
        use Permission::*;

        let built = Self::builder()
            .role(
                Role::AccountMember,
                None,
                [
                    CreateItems,
                    ReadItems,
                    SearchItems,
                    UpdateItems,
                    ArchiveItems,
                    ReadWebhooks,
                    ReadApiClients,
                ],
            )
            .role(
                Role::AccountAdmin,
                Some(Role::AccountMember),
                [
                    UpdateAccount,
                    ArchiveAccount,
                    AddMember,
                    RemoveMember,
                    ModifyMemberPermissions,
                    TransferAccount,
                    ReadAuditLogEntries,
                    CreateWebhooks,
                    UpdateWebhooks,
                    ArchiveWebhooks,
                    CreateApiClients,
                    ArchiveApiClients,
                ],
            )
            .role(
                Role::ServiceAdmin,
                Some(Role::AccountAdmin),
                [
                    CycleCookieSecret,
                    BanUser,
                    TerminateAccount,
                    ImpersonateUser,
                    ReadUsers,
                ],
            )
            .role(Role::ServiceUser, None, [])
            .build();

        match built {
            Ok(model) => model,
            // The standard graph is a fixed literal; a failure here is a bug in this file.
            Err(e) => unreachable!("standard permission model is invalid: {e}"),
        }
    }

    pub fn knows(&self, role: Role) -> bool {
        self.effective.contains_key(&role)
    }

    /// Direct parent of `role` in the inheritance chain.
    pub fn parent_of(&self, role: Role) -> Option<Role> {
        self.parents.get(&role).copied().flatten()
    }

    /// Own grants plus every ancestor's. Empty for unknown roles.
    pub fn effective_permissions(&self, role: Role) -> BTreeSet<Permission> {
        self.effective
            .get(&role)
            .map(|perms| perms.iter().copied().collect())
            .unwrap_or_default()
    }

    fn role_grants(&self, role: Role, permission: Permission) -> bool {
        self.effective
            .get(&role)
            .is_some_and(|perms| perms.contains(&permission))
    }

    /// True only if `roles` is non-empty and every role grants `permission`.
    pub fn has_permission(&self, roles: &[Role], permission: Permission) -> bool {
        !roles.is_empty() && roles.iter().all(|r| self.role_grants(*r, permission))
    }

    /// String-keyed variant for role names coming from storage. Any name that
    /// does not parse to a known role makes the whole check a deny.
    pub fn has_permission_for_names<S: AsRef<str>>(&self, names: &[S], permission: Permission) -> bool {
        let mut roles = Vec::with_capacity(names.len());
        for name in names {
            match name.as_ref().parse::<Role>() {
                Ok(role) => roles.push(role),
                Err(_) => return false,
            }
        }
        self.has_permission(&roles, permission)
    }

    pub fn service_checker<'a>(&'a self, roles: &'a [Role]) -> ServiceRolePermissionChecker<'a> {
        ServiceRolePermissionChecker { model: self, roles }
    }

    pub fn account_checker<'a>(&'a self, roles: &'a [Role]) -> AccountRolePermissionsChecker<'a> {
        AccountRolePermissionsChecker { model: self, roles }
    }
}

/// Answers permission questions for a requester's service-level roles.
#[derive(Debug, Clone, Copy)]
pub struct ServiceRolePermissionChecker<'a> {
    model: &'a PermissionModel,
    roles: &'a [Role],
}

impl ServiceRolePermissionChecker<'_> {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.model.has_permission(self.roles, permission)
    }

    pub fn is_service_admin(&self) -> bool {
        self.roles.contains(&Role::ServiceAdmin) && self.model.knows(Role::ServiceAdmin)
    }

    pub fn can_cycle_cookie_secrets(&self) -> bool {
        self.has_permission(Permission::CycleCookieSecret)
    }

    pub fn roles(&self) -> &[Role] {
        self.roles
    }
}

/// Answers permission questions for the roles a user holds within one account.
#[derive(Debug, Clone, Copy)]
pub struct AccountRolePermissionsChecker<'a> {
    model: &'a PermissionModel,
    roles: &'a [Role],
}

impl AccountRolePermissionsChecker<'_> {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.model.has_permission(self.roles, permission)
    }

    pub fn roles(&self) -> &[Role] {
        self.roles
    }
}
