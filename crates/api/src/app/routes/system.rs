use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::app::dto::{UserStatusResponse, WhoamiResponse};
use crate::app::errors::ApiError;
use crate::context::RequestIdentity;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /status - never rejects; anonymous callers are simply unauthenticated.
pub async fn status(Extension(identity): Extension<RequestIdentity>) -> impl IntoResponse {
    let body = match identity.session_context() {
        Some(ctx) => UserStatusResponse {
            is_authenticated: true,
            active_account: Some(ctx.active_account_id),
            user_reputation: Some(ctx.requester.reputation),
            reputation_explanation: ctx.requester.reputation_explanation.clone(),
        },
        None => UserStatusResponse {
            is_authenticated: false,
            active_account: None,
            user_reputation: None,
            reputation_explanation: String::new(),
        },
    };
    Json(body)
}

pub async fn whoami(Extension(identity): Extension<RequestIdentity>) -> axum::response::Response {
    let Some(ctx) = identity.session_context() else {
        return ApiError::Unauthorized("unauthenticated").into_response();
    };

    let membership = ctx.account_memberships.get(&ctx.active_account_id);
    Json(WhoamiResponse {
        user_id: ctx.user_id(),
        origin: identity.origin(),
        active_account: ctx.active_account_id,
        active_account_name: membership.map(|m| m.account_name.clone()).unwrap_or_default(),
        account_roles: membership.map(|m| m.account_roles.clone()).unwrap_or_default(),
        service_roles: ctx.requester.service_roles.clone(),
        requires_password_change: ctx.requester.requires_password_change,
    })
    .into_response()
}
