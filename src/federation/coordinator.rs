//! # Remote Action Coordinator
//!
//! Composes forwarder calls into single-node, broadcast, and transactional
//! operations. Node failures are surfaced as they are; nothing here ever
//! falls back to executing locally.
//!
//! Transactions are sagas: steps run in order, and on the first failure the
//! compensating actions of earlier committed steps run in reverse. Each step
//! carries an explicit [`StepState`] so partial outcomes can be asserted on.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::forwarder::{ForwardResult, NodeForwarder};
use super::node::Node;
use crate::constants::events;
use crate::events::EventPublisher;
use crate::logging::log_transaction_step;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    /// The call was refused before reaching the network
    #[error("Node {node} unavailable: {reason}")]
    NodeUnavailable { node: String, reason: String },
    /// The call was made and failed
    #[error("Node {node} unreachable: {reason}")]
    NodeUnreachable { node: String, reason: String },
    #[error("Invalid transaction plan: {0}")]
    InvalidPlan(String),
}

/// Aggregate of a fan-out to every eligible node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub action: String,
    pub results: Vec<ForwardResult>,
    /// Nodes left out because they were inactive or circuit-open
    pub skipped: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

impl BroadcastResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && !self.results.is_empty()
    }
}

/// One step of a transaction plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionStep {
    /// Node id or slug
    pub node: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub rollback_action: Option<String>,
    #[serde(default)]
    pub rollback_parameters: Value,
}

impl TransactionStep {
    pub fn new(node: impl Into<String>, action: impl Into<String>, parameters: Value) -> Self {
        Self {
            node: node.into(),
            action: action.into(),
            parameters,
            rollback_action: None,
            rollback_parameters: Value::Null,
        }
    }

    pub fn with_rollback(mut self, action: impl Into<String>, parameters: Value) -> Self {
        self.rollback_action = Some(action.into());
        self.rollback_parameters = parameters;
        self
    }
}

/// Ordered steps consumed top to bottom
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub steps: Vec<TransactionStep>,
}

impl TransactionPlan {
    pub fn new(steps: Vec<TransactionStep>) -> Self {
        Self { steps }
    }

    pub fn step(mut self, step: TransactionStep) -> Self {
        self.steps.push(step);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Committed,
    Failed,
    RolledBack,
    RollbackFailed,
    Skipped,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Committed => "committed",
            StepState::Failed => "failed",
            StepState::RolledBack => "rolled_back",
            StepState::RollbackFailed => "rollback_failed",
            StepState::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub node: String,
    pub action: String,
    pub state: StepState,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub rollback_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub transaction_id: Uuid,
    pub success: bool,
    pub steps: Vec<StepOutcome>,
    /// The failure that triggered rollback, never replaced by a rollback error
    pub error: Option<String>,
    pub failed_step: Option<usize>,
}

impl TransactionResult {
    pub fn state_of(&self, index: usize) -> Option<StepState> {
        self.steps.get(index).map(|s| s.state)
    }
}

/// Context of a `TRANSACTION_ROLLED_BACK` event
#[derive(Debug, Serialize)]
struct RolledBackEvent<'a> {
    transaction_id: Uuid,
    failed_step: usize,
    error: &'a str,
    steps: Vec<StepState>,
}

#[derive(Debug, Clone)]
pub struct RemoteActionCoordinator {
    forwarder: NodeForwarder,
    events: EventPublisher,
}

impl RemoteActionCoordinator {
    pub fn new(forwarder: NodeForwarder, events: EventPublisher) -> Self {
        Self { forwarder, events }
    }

    pub fn forwarder(&self) -> &NodeForwarder {
        &self.forwarder
    }

    fn resolve(&self, id_or_slug: &str) -> Result<Node, CoordinatorError> {
        self.forwarder
            .registry()
            .find(id_or_slug)
            .ok_or_else(|| CoordinatorError::NodeNotFound(id_or_slug.to_string()))
    }

    fn into_outcome(result: ForwardResult) -> Result<Value, CoordinatorError> {
        if result.success {
            return Ok(result.payload.unwrap_or(Value::Null));
        }
        let reason = result.error.unwrap_or_else(|| "unknown failure".to_string());
        if result.attempted {
            Err(CoordinatorError::NodeUnreachable {
                node: result.node_slug,
                reason,
            })
        } else {
            Err(CoordinatorError::NodeUnavailable {
                node: result.node_slug,
                reason,
            })
        }
    }

    /// Run an action on one node
    pub async fn execute_on(
        &self,
        node: &str,
        action: &str,
        parameters: Value,
    ) -> Result<Value, CoordinatorError> {
        let node = self.resolve(node)?;
        Self::into_outcome(self.forwarder.forward_action(&node, action, parameters).await)
    }

    /// Search one node
    pub async fn search_on(&self, node: &str, payload: Value) -> Result<Value, CoordinatorError> {
        let node = self.resolve(node)?;
        Self::into_outcome(self.forwarder.forward_search(&node, payload).await)
    }

    /// Run an action on every eligible node.
    ///
    /// Each node is gated on its own; one node failing never aborts another.
    /// With `parallel` the calls run concurrently and are joined once all
    /// settle.
    pub async fn execute_on_all(&self, action: &str, parameters: Value, parallel: bool) -> BroadcastResult {
        let started = Instant::now();
        let mut eligible = Vec::new();
        let mut skipped = Vec::new();
        for node in self.forwarder.registry().list() {
            if self.forwarder.is_eligible(&node).await {
                eligible.push(node);
            } else {
                skipped.push(node.slug);
            }
        }

        debug!(action = %action, eligible = eligible.len(), skipped = skipped.len(), parallel, "Broadcasting action");

        let results = if parallel {
            join_all(
                eligible
                    .iter()
                    .map(|node| self.forwarder.forward_action(node, action, parameters.clone())),
            )
            .await
        } else {
            let mut results = Vec::with_capacity(eligible.len());
            for node in &eligible {
                results.push(self.forwarder.forward_action(node, action, parameters.clone()).await);
            }
            results
        };

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        if failed > 0 {
            warn!(action = %action, succeeded, failed, "Broadcast partially failed");
        }

        BroadcastResult {
            action: action.to_string(),
            results,
            skipped,
            succeeded,
            failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Execute a plan step by step, compensating committed steps in reverse
    /// on the first failure. Rollback failures are recorded on their step and
    /// never replace the original error.
    pub async fn execute_transaction(&self, plan: TransactionPlan) -> TransactionResult {
        let transaction_id = Uuid::new_v4();
        let mut outcomes: Vec<StepOutcome> = plan
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepOutcome {
                index,
                node: step.node.clone(),
                action: step.action.clone(),
                state: StepState::Pending,
                result: None,
                error: None,
                rollback_error: None,
            })
            .collect();

        info!(transaction_id = %transaction_id, steps = plan.steps.len(), "Starting federated transaction");

        let mut failure: Option<(usize, String)> = None;
        for (index, step) in plan.steps.iter().enumerate() {
            let outcome = self
                .execute_on(&step.node, &step.action, step.parameters.clone())
                .await;
            match outcome {
                Ok(value) => {
                    outcomes[index].state = StepState::Committed;
                    outcomes[index].result = Some(value);
                    log_transaction_step(index, &step.node, &step.action, StepState::Committed.as_str(), None);
                }
                Err(e) => {
                    let message = e.to_string();
                    outcomes[index].state = StepState::Failed;
                    outcomes[index].error = Some(message.clone());
                    log_transaction_step(index, &step.node, &step.action, StepState::Failed.as_str(), Some(message.as_str()));
                    failure = Some((index, message));
                    break;
                }
            }
        }

        let Some((failed_index, message)) = failure else {
            info!(transaction_id = %transaction_id, "Federated transaction committed");
            return TransactionResult {
                transaction_id,
                success: true,
                steps: outcomes,
                error: None,
                failed_step: None,
            };
        };

        for outcome in outcomes.iter_mut().skip(failed_index + 1) {
            outcome.state = StepState::Skipped;
        }

        for index in (0..failed_index).rev() {
            let step = &plan.steps[index];
            let Some(rollback_action) = &step.rollback_action else {
                debug!(transaction_id = %transaction_id, step = index, "No compensating action, leaving step committed");
                continue;
            };

            match self
                .execute_on(&step.node, rollback_action, step.rollback_parameters.clone())
                .await
            {
                Ok(_) => {
                    outcomes[index].state = StepState::RolledBack;
                    log_transaction_step(index, &step.node, rollback_action, StepState::RolledBack.as_str(), None);
                }
                Err(e) => {
                    let rollback_error = e.to_string();
                    error!(
                        transaction_id = %transaction_id,
                        step = index,
                        node = %step.node,
                        error = %rollback_error,
                        "Rollback failed"
                    );
                    outcomes[index].state = StepState::RollbackFailed;
                    outcomes[index].rollback_error = Some(rollback_error);
                    log_transaction_step(
                        index,
                        &step.node,
                        rollback_action,
                        StepState::RollbackFailed.as_str(),
                        outcomes[index].rollback_error.as_deref(),
                    );
                }
            }
        }

        warn!(transaction_id = %transaction_id, failed_step = failed_index, error = %message, "Federated transaction rolled back");

        let rolled_back = RolledBackEvent {
            transaction_id,
            failed_step: failed_index,
            error: &message,
            steps: outcomes.iter().map(|o| o.state).collect(),
        };
        if let Err(e) = self
            .events
            .publish_serialized(events::TRANSACTION_ROLLED_BACK, &rolled_back)
            .await
        {
            debug!(error = %e, "Failed to publish transaction event");
        }

        TransactionResult {
            transaction_id,
            success: false,
            steps: outcomes,
            error: Some(message),
            failed_step: Some(failed_index),
        }
    }
}
