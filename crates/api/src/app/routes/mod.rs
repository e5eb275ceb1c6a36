use axum::{
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod rbac;
pub mod system;

/// Endpoints reachable without any identity.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/status", get(system::status))
        .route("/login", post(auth::login))
        .route("/tokens", post(auth::issue_token))
}

/// Endpoints that act on the caller's browser session.
pub fn session_router() -> Router {
    Router::new()
        .route("/logout", post(auth::logout))
        .route("/change-active-account", post(auth::change_active_account))
}

/// Endpoints for any authorized caller, cookie or token.
pub fn authorized_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/authorization/explain", get(rbac::explain_own_authorization))
        .route("/cycle-secret", post(auth::cycle_secret))
}
