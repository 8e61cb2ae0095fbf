pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::middleware::{
    audit_flush_middleware, auth_middleware, ip_rate_limit_middleware,
    request_context_middleware, IpRateLimiter,
};
use crate::services::{AdminService, AuthService, JwtService, TokenStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub pool: sqlx::PgPool,
    pub store: Arc<dyn TokenStore>,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub admin: AdminService,
    pub auth_rate_limiter: Option<IpRateLimiter>,
}

pub fn build_router(state: AppState) -> Router {
    // Credential endpoints: unauthenticated, optionally IP rate limited.
    let mut credential_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh));

    if let Some(limiter) = state.auth_rate_limiter.clone() {
        credential_routes =
            credential_routes.layer(from_fn_with_state(limiter, ip_rate_limit_middleware));
    }

    // Everything behind a bearer token.
    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/admin/grants",
            post(handlers::admin::grant_role)
                .delete(handlers::admin::revoke_role)
                .get(handlers::admin::list_grants),
        )
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(credential_routes)
        .merge(protected_routes)
        // Flush runs inside context: the trail exists before any handler and
        // is drained exactly once after the response is decided.
        .layer(from_fn_with_state(state.clone(), audit_flush_middleware))
        .layer(from_fn(request_context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
