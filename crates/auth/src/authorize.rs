use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use warden_core::{AccountId, UserId};

use crate::{Permission, PermissionModel, Reputation, Role, SessionContextData};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("no session context attached")]
    Unauthenticated,

    #[error("requester is banned")]
    Banned,

    #[error("requester is not a member of the active account")]
    NotAuthorizedForAccount,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(Permission),

    #[error("requester is not a service admin")]
    NotServiceAdmin,
}

/// Gate for every protected route.
///
/// - No IO
/// - Banned requesters are attributed but never authorized
/// - A stale active account (membership revoked since the snapshot) is rejected
pub fn authorize_request(ctx: Option<&SessionContextData>) -> Result<&SessionContextData, AuthzError> {
    let ctx = ctx.ok_or(AuthzError::Unauthenticated)?;

    if ctx.requester.reputation.is_banned() {
        return Err(AuthzError::Banned);
    }
    if !ctx.active_account_is_authorized() {
        return Err(AuthzError::NotAuthorizedForAccount);
    }

    Ok(ctx)
}

/// Every permission in `required` must be granted in the active account.
///
/// Service admins bypass per-account checks.
pub fn authorize_permissions(
    ctx: &SessionContextData,
    model: &PermissionModel,
    required: &[Permission],
) -> Result<(), AuthzError> {
    if ctx.service_permissions(model).is_service_admin() {
        return Ok(());
    }

    let checker = ctx
        .account_permissions(model, ctx.active_account_id)
        .ok_or(AuthzError::NotAuthorizedForAccount)?;

    match required.iter().find(|p| !checker.has_permission(**p)) {
        Some(missing) => Err(AuthzError::Forbidden(*missing)),
        None => Ok(()),
    }
}

pub fn require_service_admin(ctx: &SessionContextData, model: &PermissionModel) -> Result<(), AuthzError> {
    if ctx.service_permissions(model).is_service_admin() {
        Ok(())
    } else {
        Err(AuthzError::NotServiceAdmin)
    }
}

/// Account-independent check against the requester's service roles.
pub fn require_service_permission(
    ctx: &SessionContextData,
    model: &PermissionModel,
    permission: Permission,
) -> Result<(), AuthzError> {
    if ctx.service_permissions(model).has_permission(permission) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(permission))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Why a permission check against the active account came out the way it did.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub required_permission: Permission,
    pub granted: bool,
    pub reason: String,
    pub requester: RequesterState,
    pub denial: Option<DenialKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequesterState {
    pub user_id: UserId,
    pub reputation: Reputation,
    pub active_account_id: AccountId,
    pub service_roles: Vec<Role>,
    pub account_roles: Vec<Role>,
    pub effective_permissions: BTreeSet<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    Banned,
    NotAMember,
    MissingPermission,
}

/// Mirror of [`authorize_request`] + [`authorize_permissions`] that reports
/// instead of short-circuiting. Used for debug logging of denials.
pub fn explain(ctx: &SessionContextData, model: &PermissionModel, required: Permission) -> AuthorizationExplanation {
    let account_roles: Vec<Role> = ctx
        .account_memberships
        .get(&ctx.active_account_id)
        .map(|m| m.account_roles.clone())
        .unwrap_or_default();

    // Effective set under AND semantics: what every held role grants.
    let effective_permissions: BTreeSet<Permission> = Permission::ALL
        .iter()
        .copied()
        .filter(|p| model.has_permission(&account_roles, *p))
        .collect();

    let requester = RequesterState {
        user_id: ctx.user_id(),
        reputation: ctx.requester.reputation,
        active_account_id: ctx.active_account_id,
        service_roles: ctx.requester.service_roles.clone(),
        account_roles,
        effective_permissions,
    };

    let deny = |kind: DenialKind, reason: String, requester: RequesterState| AuthorizationExplanation {
        required_permission: required,
        granted: false,
        reason,
        requester,
        denial: Some(kind),
    };
    let allow = |reason: String, requester: RequesterState| AuthorizationExplanation {
        required_permission: required,
        granted: true,
        reason,
        requester,
        denial: None,
    };

    if ctx.requester.reputation.is_banned() {
        return deny(DenialKind::Banned, "requester is banned".to_string(), requester);
    }
    if !ctx.active_account_is_authorized() {
        return deny(
            DenialKind::NotAMember,
            format!("requester holds no membership in active account {}", ctx.active_account_id),
            requester,
        );
    }
    if ctx.service_permissions(model).is_service_admin() {
        return allow("service admin bypasses account checks".to_string(), requester);
    }
    if requester.effective_permissions.contains(&required) {
        let reason = format!("granted '{required}' by account roles {:?}", requester.account_roles);
        return allow(reason, requester);
    }

    let reason = format!(
        "account roles {:?} do not all grant '{required}'",
        requester.account_roles
    );
    deny(DenialKind::MissingPermission, reason, requester)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::fixtures::{requester, two_account_context};

    fn model() -> PermissionModel {
        PermissionModel::standard()
    }

    #[test]
    fn anonymous_is_unauthenticated() {
        assert_eq!(authorize_request(None).unwrap_err(), AuthzError::Unauthenticated);
    }

    #[test]
    fn banned_requester_is_rejected() {
        let mut ctx = two_account_context(AccountId::new(), AccountId::new());
        ctx.requester.reputation = Reputation::Banned;
        assert_eq!(authorize_request(Some(&ctx)).unwrap_err(), AuthzError::Banned);
    }

    #[test]
    fn stale_active_account_is_rejected() {
        let mut ctx = two_account_context(AccountId::new(), AccountId::new());
        ctx.active_account_id = AccountId::new();
        assert_eq!(
            authorize_request(Some(&ctx)).unwrap_err(),
            AuthzError::NotAuthorizedForAccount
        );
    }

    #[test]
    fn permission_held_only_in_another_account_is_forbidden() {
        let (a, b) = (AccountId::new(), AccountId::new());
        let ctx = two_account_context(a, b);

        // Admin of b, member of a, active in a.
        let err = authorize_permissions(&ctx, &model(), &[Permission::AddMember]).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden(Permission::AddMember));

        let mut switched = ctx.clone();
        switched.active_account_id = b;
        assert!(authorize_permissions(&switched, &model(), &[Permission::AddMember]).is_ok());
    }

    #[test]
    fn every_required_permission_must_hold() {
        let ctx = two_account_context(AccountId::new(), AccountId::new());
        assert!(authorize_permissions(&ctx, &model(), &[Permission::ReadItems]).is_ok());
        assert_eq!(
            authorize_permissions(&ctx, &model(), &[Permission::ReadItems, Permission::UpdateAccount]),
            Err(AuthzError::Forbidden(Permission::UpdateAccount))
        );
    }

    #[test]
    fn service_admin_bypasses_account_checks() {
        let mut ctx = two_account_context(AccountId::new(), AccountId::new());
        ctx.requester = requester(vec![Role::ServiceAdmin]);
        assert!(authorize_permissions(&ctx, &model(), &[Permission::TransferAccount]).is_ok());
        assert!(require_service_admin(&ctx, &model()).is_ok());
        assert!(require_service_permission(&ctx, &model(), Permission::CycleCookieSecret).is_ok());
    }

    #[test]
    fn service_user_has_no_service_powers() {
        let ctx = two_account_context(AccountId::new(), AccountId::new());
        assert_eq!(require_service_admin(&ctx, &model()), Err(AuthzError::NotServiceAdmin));
        assert_eq!(
            require_service_permission(&ctx, &model(), Permission::CycleCookieSecret),
            Err(AuthzError::Forbidden(Permission::CycleCookieSecret))
        );
    }

    #[test]
    fn explanation_agrees_with_decision() {
        let m = model();
        let ctx = two_account_context(AccountId::new(), AccountId::new());

        for p in Permission::ALL {
            let decided = authorize_request(Some(&ctx)).is_ok() && authorize_permissions(&ctx, &m, &[p]).is_ok();
            let explained = explain(&ctx, &m, p);
            assert_eq!(decided, explained.granted, "{p}");
        }
    }

    #[test]
    fn explanation_names_the_denial() {
        let m = model();
        let mut ctx = two_account_context(AccountId::new(), AccountId::new());

        let e = explain(&ctx, &m, Permission::UpdateAccount);
        assert_eq!(e.denial, Some(DenialKind::MissingPermission));
        assert_eq!(e.requester.account_roles, vec![Role::AccountMember]);

        ctx.requester.reputation = Reputation::Banned;
        assert_eq!(explain(&ctx, &m, Permission::ReadItems).denial, Some(DenialKind::Banned));
    }
}
