use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use warden_auth::{AuthzError, Permission, authorize_permissions, authorize_request, explain, require_service_admin};

use crate::app::errors::ApiError;
use crate::app::services::AuthService;
use crate::context::RequestIdentity;

/// Works out who the caller is and attaches a [`RequestIdentity`]. Never
/// rejects anonymous callers; that is the authorization middleware's job.
pub async fn attribution_middleware(
    State(service): State<Arc<AuthService>>,
    mut req: Request,
    next: Next,
) -> Response {
    let identity = match service.attribute(req.headers()).await {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

static ANONYMOUS: RequestIdentity = RequestIdentity::Anonymous;

/// Rejects requests not attributed through a live cookie session. A bearer
/// token alongside a stale cookie does not count.
pub async fn cookie_requirement_middleware(req: Request, next: Next) -> Response {
    if identity(&req).session_token().is_none() {
        return ApiError::Unauthorized("login required").into_response();
    }
    next.run(req).await
}

fn identity(req: &Request) -> &RequestIdentity {
    req.extensions().get::<RequestIdentity>().unwrap_or(&ANONYMOUS)
}

fn authz_rejection(err: AuthzError) -> Response {
    match err {
        AuthzError::Unauthenticated => ApiError::Unauthorized("unauthenticated"),
        AuthzError::NotAuthorizedForAccount => ApiError::Unauthorized("not authorized for account"),
        AuthzError::Banned => ApiError::Forbidden("banned".to_string()),
        AuthzError::Forbidden(p) => ApiError::Forbidden(format!("missing permission '{p}'")),
        AuthzError::NotServiceAdmin => ApiError::Forbidden("admin status required".to_string()),
    }
    .into_response()
}

/// Requires an attributed, non-banned caller whose active account is one of
/// their memberships.
pub async fn authorization_middleware(req: Request, next: Next) -> Response {
    match authorize_request(identity(&req).session_context()) {
        Ok(ctx) => {
            debug!(user_id = %ctx.user_id(), account_id = %ctx.active_account_id, "request authorized");
        }
        Err(e) => {
            debug!(error = %e, "request not authorized");
            return authz_rejection(e);
        }
    }
    next.run(req).await
}

/// State for [`permission_filter_middleware`].
#[derive(Clone)]
pub struct PermissionFilter {
    service: Arc<AuthService>,
    required: Arc<[Permission]>,
}

impl PermissionFilter {
    pub fn new(service: Arc<AuthService>, required: &[Permission]) -> Self {
        Self {
            service,
            required: required.into(),
        }
    }
}

/// Every required permission must be granted in the active account. Service
/// admins pass unconditionally.
pub async fn permission_filter_middleware(
    State(filter): State<PermissionFilter>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ctx) = identity(&req).session_context() else {
        return authz_rejection(AuthzError::Unauthenticated);
    };

    if let Err(e) = authorize_permissions(ctx, filter.service.model(), &filter.required) {
        if let AuthzError::Forbidden(p) = &e {
            let explanation = explain(ctx, filter.service.model(), *p);
            debug!(
                user_id = %ctx.user_id(),
                account_id = %ctx.active_account_id,
                requested_permission = %p,
                reason = %explanation.reason,
                "inadequate permissions"
            );
        }
        return authz_rejection(e);
    }

    next.run(req).await
}

/// Restricts to requesters holding the service-admin role.
pub async fn service_admin_middleware(
    State(service): State<Arc<AuthService>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ctx) = identity(&req).session_context() else {
        return authz_rejection(AuthzError::Unauthenticated);
    };

    if let Err(e) = require_service_admin(ctx, service.model()) {
        debug!(user_id = %ctx.user_id(), "service admin route called by non-admin");
        return authz_rejection(e);
    }

    next.run(req).await
}
