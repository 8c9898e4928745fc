//! # Rate Limiting Middleware
//!
//! Per-node, per-endpoint fixed windows. Runs after authentication.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::constants::headers;
use crate::federation::RateLimitDecision;
use crate::web::errors::ApiError;
use crate::web::state::{AppState, AuthenticatedNode};

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = request
        .extensions()
        .get::<AuthenticatedNode>()
        .map(|AuthenticatedNode(node)| node.identity())
        .ok_or_else(|| ApiError::auth_error("Request is not authenticated"))?;
    let endpoint = request.uri().path().to_string();

    match state.context.rate_limiter().check(&identity, &endpoint).await {
        RateLimitDecision::Limited { limit, retry_after } => {
            warn!(
                node = %identity,
                endpoint = %endpoint,
                limit = limit,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            Err(ApiError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            })
        }
        RateLimitDecision::Allowed {
            limit,
            remaining,
            reset_after,
        } => {
            debug!(node = %identity, endpoint = %endpoint, remaining = remaining, "Rate limit check passed");
            let mut response = next.run(request).await;
            let response_headers = response.headers_mut();
            response_headers.insert(headers::RATE_LIMIT_LIMIT, HeaderValue::from(limit));
            response_headers.insert(headers::RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
            response_headers.insert(headers::RATE_LIMIT_RESET, HeaderValue::from(reset_after.as_secs()));
            Ok(response)
        }
    }
}
