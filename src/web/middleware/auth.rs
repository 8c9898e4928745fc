//! # Authentication Middleware
//!
//! Resolves the bearer credential of an inbound node request.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::federation::NodeAuthenticator;
use crate::web::errors::ApiError;
use crate::web::state::{AppState, AuthenticatedNode};

/// Authentication middleware for protected endpoints
///
/// On success the node is inserted into request extensions as
/// [`AuthenticatedNode`] for the rate limiter and handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::auth_error("Missing authorization header"))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::auth_error("Invalid authorization header format"))?;

    let credential = NodeAuthenticator::extract_bearer_token(auth_str)?;

    let node = state.context.authenticator().authenticate(credential).map_err(|e| {
        warn!(error = %e, path = %request.uri().path(), "Node authentication rejected");
        ApiError::from(e)
    })?;

    debug!(node_id = %node.id, slug = %node.slug, "Authenticated node request");

    request.extensions_mut().insert(AuthenticatedNode(node));

    Ok(next.run(request).await)
}
