//! # Web API Middleware
//!
//! Authentication and rate limiting for node-facing routes, plus the shared
//! tracing and timeout stack.

pub mod auth;
pub mod rate_limit;

use axum::middleware;
use axum::Router;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::web::state::AppState;

/// Require a node credential, then enforce that node's rate limit.
///
/// Layers added later run first, so authentication wraps the limiter.
pub fn protect(router: Router<AppState>, state: AppState) -> Router<AppState> {
    router
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce_rate_limit,
        ))
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth))
}

/// Apply the shared middleware stack for every route
pub fn apply_middleware_stack(router: Router<AppState>, request_timeout: Duration) -> Router<AppState> {
    router
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
