//! # Health and Status Handlers

use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::federation::NodeStatus;
use crate::resilience::CircuitRecord;
use crate::web::errors::{ApiError, ApiResult};
use crate::web::state::{AppState, AuthenticatedNode};

/// Basic health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct NodeSummary {
    pub id: Uuid,
    pub slug: String,
    pub status: NodeStatus,
    pub response_time_ms: Option<f64>,
    pub in_flight: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub timestamp: String,
    pub caller: String,
    pub nodes: Vec<NodeSummary>,
    pub provider_circuits: Vec<CircuitRecord>,
}

/// Liveness check: GET /health
///
/// Unauthenticated; remote nodes ping this to measure reachability.
pub async fn basic_health(_state: State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Federation status for an authenticated node: GET /status
pub async fn node_status(
    State(state): State<AppState>,
    Extension(AuthenticatedNode(caller)): Extension<AuthenticatedNode>,
) -> ApiResult<Json<StatusResponse>> {
    let registry = state.context.registry();
    let nodes = registry
        .list()
        .into_iter()
        .map(|node| NodeSummary {
            in_flight: registry.in_flight(&node.id),
            id: node.id,
            slug: node.slug,
            status: node.status,
            response_time_ms: node.response_time_ms,
        })
        .collect::<Vec<_>>();

    let provider_circuits = state
        .context
        .get_circuit_breaker_status(None)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to read provider circuits");
            ApiError::Internal
        })?;

    debug!(caller = %caller.slug, nodes = nodes.len(), "Serving federation status");

    Ok(Json(StatusResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        caller: caller.slug,
        nodes,
        provider_circuits,
    }))
}
