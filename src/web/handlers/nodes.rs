//! # Node Registration Handlers
//!
//! `/register` admits a new node and hands back its credentials;
//! `/refresh-token` reissues a signed token for an authenticated node.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::headers;
use crate::federation::{IssuedToken, Node, NodeRegistration};
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::{AppState, AuthenticatedNode};

#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub node: Node,
    /// Static key; shown once
    pub credential: String,
    /// Absent when signed tokens are disabled
    pub token: Option<IssuedToken>,
}

/// Register a node: POST /register
pub async fn register_node(
    State(state): State<AppState>,
    request_headers: HeaderMap,
    Json(registration): Json<NodeRegistration>,
) -> ApiResult<(StatusCode, Json<RegistrationResponse>)> {
    let authenticator = state.context.authenticator();
    let provided_key = request_headers
        .get(headers::REGISTRATION_KEY)
        .and_then(|value| value.to_str().ok());
    authenticator.check_registration_key(provided_key)?;

    let node = state.context.registry().register(registration.into_node())?;
    let token = if authenticator.config().tokens_enabled {
        Some(authenticator.issue_token(&node)?)
    } else {
        None
    };

    info!(node_id = %node.id, slug = %node.slug, url = %node.url, "🤝 Node registered");

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            credential: node.credential.clone(),
            node,
            token,
        }),
    ))
}

/// Reissue a signed token: POST /refresh-token
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(AuthenticatedNode(node)): Extension<AuthenticatedNode>,
) -> ApiResult<Json<IssuedToken>> {
    let authenticator = state.context.authenticator();
    if !authenticator.config().tokens_enabled {
        return Err(ApiError::bad_request("Signed node tokens are disabled"));
    }
    let token = authenticator.issue_token(&node)?;
    info!(node_id = %node.id, slug = %node.slug, expires_at = %token.expires_at, "Node token refreshed");
    Ok(Json(token))
}
