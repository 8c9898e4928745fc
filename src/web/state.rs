//! # Web API Application State
//!
//! Shared state for the node server: the federation context and the host
//! application's handler for local search and actions.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

use crate::context::FederationContext;
use crate::federation::{CoordinatorError, Node};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LocalHandlerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
    /// A call the handler chained to another node failed
    #[error(transparent)]
    Remote(#[from] CoordinatorError),
}

/// Host application hook serving inbound `/search` and `/actions` calls
#[async_trait]
pub trait LocalNodeHandler: Send + Sync {
    async fn search(&self, caller: &Node, payload: Value) -> Result<Value, LocalHandlerError>;

    async fn execute_action(
        &self,
        caller: &Node,
        action: &str,
        parameters: Value,
    ) -> Result<Value, LocalHandlerError>;
}

/// The node that passed authentication, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedNode(pub Node);

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<FederationContext>,
    pub handler: Arc<dyn LocalNodeHandler>,
}

impl AppState {
    pub fn new(context: Arc<FederationContext>, handler: Arc<dyn LocalNodeHandler>) -> Self {
        Self { context, handler }
    }
}
