//! HTTP application wiring (axum router + middleware stack).
//!
//! - `services.rs`: the auth service and its collaborators
//! - `routes/`: handlers, grouped by the middleware they sit behind
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use warden_auth::Permission;

use crate::middleware::{self, PermissionFilter};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AuthService;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(service: Arc<AuthService>) -> Router {
    build_app_with_routes(service, Router::new())
}

/// Like [`build_app`], with `extra` routes mounted under the same attribution
/// layer. Gate them with [`with_permissions`] or [`authorized`].
pub fn build_app_with_routes(service: Arc<AuthService>, extra: Router) -> Router {
    let session =
        routes::session_router().route_layer(axum::middleware::from_fn(middleware::cookie_requirement_middleware));

    let admin = authorized(routes::rbac::admin_router().route_layer(axum::middleware::from_fn_with_state(
        service.clone(),
        middleware::service_admin_middleware,
    )));

    Router::new()
        .merge(routes::public_router())
        .merge(session)
        .merge(authorized(routes::authorized_router()))
        .nest("/admin/rbac", admin)
        .merge(extra)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    service.clone(),
                    middleware::attribution_middleware,
                ))
                .layer(Extension(service)),
        )
}

/// Require an authorized caller on every route of `router`.
pub fn authorized(router: Router) -> Router {
    router.route_layer(axum::middleware::from_fn(middleware::authorization_middleware))
}

/// Require an authorized caller holding every permission in `required` within
/// their active account.
pub fn with_permissions(router: Router, service: &Arc<AuthService>, required: &[Permission]) -> Router {
    let filter = PermissionFilter::new(service.clone(), required);
    authorized(router.route_layer(axum::middleware::from_fn_with_state(
        filter,
        middleware::permission_filter_middleware,
    )))
}
