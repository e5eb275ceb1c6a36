//! Login, logout, account switching, token issuance and secret cycling.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tracing::{debug, error};

use warden_auth::{AuthzError, SIGNATURE_HEADER, TokenRequest};

use crate::app::dto::{ChangeActiveAccountRequest, LoginRequest, TokenResponse, UserStatusResponse};
use crate::app::errors::{ApiError, decode_body};
use crate::app::services::AuthService;
use crate::context::RequestIdentity;

/// POST /login
pub async fn login(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(identity): Extension<RequestIdentity>,
    body: Bytes,
) -> Response {
    let input: LoginRequest = match decode_body(&body) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };

    match service.authenticate_user(&input, identity.session_token()).await {
        Ok((user, account_id, cookie)) => {
            let status = UserStatusResponse {
                is_authenticated: true,
                active_account: Some(account_id),
                user_reputation: Some(user.reputation),
                reputation_explanation: user.reputation_explanation,
            };
            (StatusCode::ACCEPTED, [(header::SET_COOKIE, cookie)], Json(status)).into_response()
        }
        Err(e) => {
            debug!(username = %input.username, error = %e, "login rejected");
            ApiError::from(e).into_response()
        }
    }
}

/// POST /logout
pub async fn logout(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(identity): Extension<RequestIdentity>,
) -> Response {
    let RequestIdentity::Cookie { session_token, context: ctx } = &identity else {
        return ApiError::Unauthorized("unauthenticated").into_response();
    };

    let (clear_cookie, result) = service.logout(Some(session_token.as_str()), ctx.user_id()).await;
    let set_cookie = [(header::SET_COOKIE, clear_cookie)];

    match result {
        Ok(()) => (set_cookie, Redirect::to("/")).into_response(),
        Err(e) => {
            error!(user_id = %ctx.user_id(), error = %e, "destroying user session");
            (set_cookie, ApiError::Internal).into_response()
        }
    }
}

/// POST /change-active-account
pub async fn change_active_account(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(identity): Extension<RequestIdentity>,
    body: Bytes,
) -> Response {
    let RequestIdentity::Cookie { session_token, context: ctx } = &identity else {
        return ApiError::Unauthorized("unauthenticated").into_response();
    };

    let input: ChangeActiveAccountRequest = match decode_body(&body) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = input.validate() {
        return ApiError::InvalidInput(e.to_string()).into_response();
    }

    match service
        .change_active_account(Some(session_token.as_str()), ctx.user_id(), input.account_id)
        .await
    {
        Ok(cookie) => (StatusCode::ACCEPTED, [(header::SET_COOKIE, cookie)]).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /tokens
pub async fn issue_token(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let input: TokenRequest = match decode_body(&body) {
        Ok(v) => v,
        Err(e) => return e.into_response(),
    };
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match service.issue_token(&input, signature).await {
        Ok(issued) => {
            let res = TokenResponse {
                token: issued.token,
                expires_at: issued.expires_at.to_rfc3339(),
            };
            (StatusCode::ACCEPTED, Json(res)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// POST /cycle-secret
pub async fn cycle_secret(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(identity): Extension<RequestIdentity>,
) -> Response {
    let Some(ctx) = identity.session_context() else {
        return ApiError::Unauthorized("unauthenticated").into_response();
    };

    match service.cycle_cookie_secret(ctx) {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(AuthzError::Forbidden(_)) | Err(AuthzError::NotServiceAdmin) => {
            debug!(user_id = %ctx.user_id(), "invalid permissions for cycling cookie secret");
            ApiError::Forbidden("inadequate permissions".to_string()).into_response()
        }
        Err(_) => ApiError::Unauthorized("unauthenticated").into_response(),
    }
}
