//! # Node Server
//!
//! axum application exposing the node API to other federation members.
//! `/register` and `/health` are open; every other route requires a node
//! credential and is rate limited per node and endpoint.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

pub use errors::{ApiError, ApiResult};
pub use state::{AppState, AuthenticatedNode, LocalHandlerError, LocalNodeHandler};

/// Build the router for the node API
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/search", post(handlers::operations::search))
        .route("/actions", post(handlers::operations::execute_action))
        .route("/status", get(handlers::health::node_status))
        .route("/refresh-token", post(handlers::nodes::refresh_token));
    let protected = middleware::protect(protected, state.clone());

    let public = Router::new()
        .route("/register", post(handlers::nodes::register_node))
        .route("/health", get(handlers::health::basic_health));

    let request_timeout = state.context.config().node_request_timeout();
    middleware::apply_middleware_stack(public.merge(protected), request_timeout).with_state(state)
}

/// Serve the node API on an already-bound listener until the future is dropped
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let address = listener.local_addr()?;
    info!(address = %address, "🚀 Node server listening");
    axum::serve(listener, create_app(state)).await
}

/// Bind the configured address and serve the node API
pub async fn bind_and_serve(state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(&state.context.config().federation.bind_address).await?;
    serve(listener, state).await
}
