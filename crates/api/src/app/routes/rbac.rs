//! RBAC inspection endpoints.
//!
//! The admin listings expose the role graph; `/authorization/explain` lets any
//! authorized caller ask why they can or cannot use a permission.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use warden_auth::{Permission, Role, explain};

use crate::app::errors::ApiError;
use crate::app::services::AuthService;
use crate::context::RequestIdentity;

// ─────────────────────────────────────────────────────────────────────────────
// Query Parameters / Views
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub permission: String,
}

#[derive(Debug, Serialize)]
pub struct RoleView {
    pub name: Role,
    pub parent: Option<Role>,
    pub service_role: bool,
    pub permissions: Vec<Permission>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Mounted under `/admin/rbac` behind the service-admin middleware.
pub fn admin_router() -> Router {
    Router::new()
        .route("/roles", get(list_roles))
        .route("/permissions", get(list_permissions))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/rbac/roles
pub async fn list_roles(Extension(service): Extension<Arc<AuthService>>) -> impl IntoResponse {
    let model = service.model();
    let roles: Vec<RoleView> = Role::ALL
        .iter()
        .copied()
        .filter(|r| model.knows(*r))
        .map(|r| RoleView {
            name: r,
            parent: model.parent_of(r),
            service_role: r.is_service_role(),
            permissions: model.effective_permissions(r).into_iter().collect(),
        })
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "roles": roles })))
}

/// GET /admin/rbac/permissions
pub async fn list_permissions() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "permissions": Permission::ALL })),
    )
}

/// GET /authorization/explain?permission=X
pub async fn explain_own_authorization(
    Extension(service): Extension<Arc<AuthService>>,
    Extension(identity): Extension<RequestIdentity>,
    Query(query): Query<ExplainQuery>,
) -> axum::response::Response {
    let Some(ctx) = identity.session_context() else {
        return ApiError::Unauthorized("unauthenticated").into_response();
    };
    let Some(permission) = Permission::from_name(query.permission.trim()) else {
        return ApiError::InvalidInput(format!("unknown permission '{}'", query.permission)).into_response();
    };

    let explanation = explain(ctx, service.model(), permission);
    (StatusCode::OK, Json(serde_json::json!({ "explanation": explanation }))).into_response()
}
