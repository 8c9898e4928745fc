//! # Node Transport
//!
//! The outbound wire to a remote node. [`NodeTransport`] is the seam the
//! forwarder calls through; [`HttpNodeTransport`] speaks the node HTTP API
//! with `reqwest`, presenting the target node's static key as a bearer token.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::node::Node;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Connection to {url} failed: {reason}")]
    Connection { url: String, reason: String },
    #[error("Node responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response body: {0}")]
    Decode(String),
    #[error("Transport configuration error: {0}")]
    Configuration(String),
}

/// One call against the node API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeRequest {
    Search { payload: Value },
    Action { action: String, parameters: Value },
    Health,
    Status,
}

impl NodeRequest {
    pub fn search(payload: Value) -> Self {
        NodeRequest::Search { payload }
    }

    pub fn action(action: impl Into<String>, parameters: Value) -> Self {
        NodeRequest::Action {
            action: action.into(),
            parameters,
        }
    }

    /// Short name used in logs and metric labels
    pub fn operation(&self) -> &'static str {
        match self {
            NodeRequest::Search { .. } => "search",
            NodeRequest::Action { .. } => "action",
            NodeRequest::Health => "ping",
            NodeRequest::Status => "status",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            NodeRequest::Search { .. } => "/search",
            NodeRequest::Action { .. } => "/actions",
            NodeRequest::Health => "/health",
            NodeRequest::Status => "/status",
        }
    }

    fn method(&self) -> Method {
        match self {
            NodeRequest::Search { .. } | NodeRequest::Action { .. } => Method::POST,
            NodeRequest::Health | NodeRequest::Status => Method::GET,
        }
    }

    fn body(&self) -> Option<Value> {
        match self {
            NodeRequest::Search { payload } => Some(payload.clone()),
            NodeRequest::Action { action, parameters } => Some(json!({
                "action": action,
                "parameters": parameters,
            })),
            NodeRequest::Health | NodeRequest::Status => None,
        }
    }
}

#[async_trait]
pub trait NodeTransport: Send + Sync + std::fmt::Debug {
    /// Perform one request against `node` and return its JSON body
    async fn send(&self, node: &Node, request: &NodeRequest) -> Result<Value, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpNodeTransport {
    client: reqwest::Client,
}

impl HttpNodeTransport {
    /// `timeout` is the client-level ceiling; the forwarder applies its own
    /// per-call bound on top.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                TransportError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeTransport for HttpNodeTransport {
    async fn send(&self, node: &Node, request: &NodeRequest) -> Result<Value, TransportError> {
        let url = node.endpoint(request.path());
        debug!(node = %node.slug, url = %url, operation = request.operation(), "Sending node request");

        let mut builder = self
            .client
            .request(request.method(), &url)
            .bearer_auth(&node.credential);
        if let Some(body) = request.body() {
            builder = builder.json(&body);
        }

        let response = builder.send().await.map_err(|e| TransportError::Connection {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| TransportError::Connection {
            url,
            reason: e.to_string(),
        })?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
