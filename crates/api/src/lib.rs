//! HTTP API: configuration, request attribution, authorization middleware and
//! the auth routes.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
