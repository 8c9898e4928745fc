//! # Search and Action Handlers
//!
//! Inbound domain calls from other nodes, dispatched to the host
//! application's [`LocalNodeHandler`](crate::web::state::LocalNodeHandler).

use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

use crate::logging::log_node_operation;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::{AppState, AuthenticatedNode};

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
}

/// Local search on behalf of a remote node: POST /search
pub async fn search(
    State(state): State<AppState>,
    Extension(AuthenticatedNode(caller)): Extension<AuthenticatedNode>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let started = Instant::now();
    let result = state.handler.search(&caller, payload).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(value) => {
            log_node_operation("serve_search", &caller.slug, "success", Some(elapsed_ms), None);
            Ok(Json(value))
        }
        Err(e) => {
            log_node_operation("serve_search", &caller.slug, "failure", Some(elapsed_ms), Some(&e.to_string()));
            Err(e.into())
        }
    }
}

/// Local action on behalf of a remote node: POST /actions
pub async fn execute_action(
    State(state): State<AppState>,
    Extension(AuthenticatedNode(caller)): Extension<AuthenticatedNode>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<Json<Value>> {
    if request.action.trim().is_empty() {
        return Err(ApiError::bad_request("action must not be empty"));
    }
    debug!(caller = %caller.slug, action = %request.action, "Dispatching inbound action");

    let started = Instant::now();
    let result = state
        .handler
        .execute_action(&caller, &request.action, request.parameters)
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(value) => {
            log_node_operation("serve_action", &caller.slug, "success", Some(elapsed_ms), Some(&request.action));
            Ok(Json(value))
        }
        Err(e) => {
            log_node_operation("serve_action", &caller.slug, "failure", Some(elapsed_ms), Some(&e.to_string()));
            Err(e.into())
        }
    }
}
