//! # Node Forwarder
//!
//! A single outbound call to one node. Calls are refused without touching the
//! network when the node is not active or its circuit is open; otherwise they
//! run under a bounded timeout and the outcome feeds the node-scope circuit
//! breaker and health tracker.

use futures::future::join_all;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::node::{Node, NodeStatus};
use super::registry::NodeRegistry;
use super::transport::{NodeRequest, NodeTransport};
use crate::constants::{defaults, events};
use crate::events::EventPublisher;
use crate::logging::log_node_operation;
use crate::metrics;
use crate::resilience::{CircuitBreaker, HealthTracker};

/// Outcome of one forwarded call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardResult {
    pub success: bool,
    pub node_id: Uuid,
    pub node_slug: String,
    /// False when the call was refused before reaching the network
    pub attempted: bool,
    pub payload: Option<Value>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ForwardResult {
    fn refused(node: &Node, reason: String) -> Self {
        Self {
            success: false,
            node_id: node.id,
            node_slug: node.slug.clone(),
            attempted: false,
            payload: None,
            error: Some(reason),
            elapsed_ms: 0,
        }
    }
}

/// Outcome of a health ping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResult {
    pub node_id: Uuid,
    pub node_slug: String,
    pub reachable: bool,
    pub response_time_ms: Option<f64>,
    pub status: NodeStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NodeForwarder {
    registry: Arc<NodeRegistry>,
    transport: Arc<dyn NodeTransport>,
    breaker: CircuitBreaker,
    health: HealthTracker,
    events: EventPublisher,
    timeout: Duration,
}

impl NodeForwarder {
    pub fn new(
        registry: Arc<NodeRegistry>,
        transport: Arc<dyn NodeTransport>,
        breaker: CircuitBreaker,
        health: HealthTracker,
        events: EventPublisher,
    ) -> Self {
        Self {
            registry,
            transport,
            breaker,
            health,
            events,
            timeout: Duration::from_millis(defaults::NODE_REQUEST_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub async fn forward_search(&self, node: &Node, payload: Value) -> ForwardResult {
        self.forward(node, NodeRequest::search(payload)).await
    }

    pub async fn forward_action(&self, node: &Node, action: &str, parameters: Value) -> ForwardResult {
        self.forward(node, NodeRequest::action(action, parameters)).await
    }

    /// Whether a call to `node` would currently be attempted, without
    /// consuming a half-open probe
    pub async fn is_eligible(&self, node: &Node) -> bool {
        let current = self.current(node);
        current.is_active() && self.breaker.allows_traffic(&current.identity()).await
    }

    /// Latest registry view of a node, falling back to the caller's copy
    fn current(&self, node: &Node) -> Node {
        self.registry.get(&node.id).unwrap_or_else(|| node.clone())
    }

    pub async fn forward(&self, node: &Node, request: NodeRequest) -> ForwardResult {
        let node = self.current(node);
        let operation = request.operation();
        let identity = node.identity();

        if !node.is_active() {
            debug!(node = %node.slug, status = %node.status, operation, "Node not active, refusing call");
            self.count(operation, "skipped");
            return ForwardResult::refused(&node, format!("node {} is {}", node.slug, node.status));
        }

        if self.breaker.is_open(&identity).await {
            debug!(node = %node.slug, operation, "Node circuit open, refusing call");
            self.count(operation, "skipped");
            return ForwardResult::refused(&node, format!("circuit open for node {}", node.slug));
        }

        let started = Instant::now();
        let outcome = {
            let _in_flight = self.registry.track_in_flight(&node.id);
            tokio::time::timeout(self.timeout, self.transport.send(&node, &request)).await
        };
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        let failure = match outcome {
            Ok(Ok(payload)) => {
                self.breaker.record_success(&identity).await;
                self.health.record_success(&identity, elapsed).await;
                self.count(operation, "success");
                log_node_operation(operation, &node.slug, "success", Some(elapsed_ms), None);
                return ForwardResult {
                    success: true,
                    node_id: node.id,
                    node_slug: node.slug,
                    attempted: true,
                    payload: Some(payload),
                    error: None,
                    elapsed_ms,
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("node {} timed out after {}ms", node.slug, self.timeout.as_millis()),
        };

        self.breaker.record_failure(&identity).await;
        self.health.record_failure(&identity, &failure).await;
        self.count(operation, "failure");
        log_node_operation(operation, &node.slug, "failure", Some(elapsed_ms), Some(failure.as_str()));

        ForwardResult {
            success: false,
            node_id: node.id,
            node_slug: node.slug,
            attempted: true,
            payload: None,
            error: Some(failure),
            elapsed_ms,
        }
    }

    /// `GET /health` on a node, bypassing circuit gating.
    ///
    /// Records the ping time and latency in the registry and flips the node
    /// between active and error. Inactive nodes keep their status.
    pub async fn ping(&self, node: &Node) -> PingResult {
        let node = self.current(node);
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.transport.send(&node, &NodeRequest::Health)).await;
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (reachable, error) = match outcome {
            Ok(Ok(_)) => (true, None),
            Ok(Err(e)) => (false, Some(e.to_string())),
            Err(_) => (false, Some(format!("ping timed out after {}ms", self.timeout.as_millis()))),
        };
        self.count("ping", if reachable { "success" } else { "failure" });

        let measured = reachable.then_some(response_time_ms);
        if let Err(e) = self.registry.record_ping(&node.id, measured) {
            warn!(node = %node.slug, error = %e, "Pinged node is no longer registered");
        }

        let status = match (node.status, reachable) {
            (NodeStatus::Inactive, _) => NodeStatus::Inactive,
            (_, true) => NodeStatus::Active,
            (_, false) => NodeStatus::Error,
        };
        if status != node.status {
            self.change_status(&node, status, error.as_deref()).await;
        }

        log_node_operation(
            "ping",
            &node.slug,
            if reachable { "success" } else { "failure" },
            Some(response_time_ms as u64),
            error.as_deref(),
        );

        PingResult {
            node_id: node.id,
            node_slug: node.slug,
            reachable,
            response_time_ms: measured,
            status,
            error,
        }
    }

    /// Ping every registered node concurrently
    pub async fn ping_all(&self) -> Vec<PingResult> {
        let nodes = self.registry.list();
        join_all(nodes.iter().map(|node| self.ping(node))).await
    }

    async fn change_status(&self, node: &Node, status: NodeStatus, reason: Option<&str>) {
        if self.registry.set_status(&node.id, status).is_err() {
            return;
        }
        info!(node = %node.slug, from = %node.status, to = %status, "Node status changed");

        let context = json!({
            "node_id": node.id,
            "node_slug": node.slug,
            "from": node.status,
            "to": status,
            "reason": reason,
        });
        if let Err(e) = self.events.publish(events::NODE_STATUS_CHANGED, context).await {
            debug!(error = %e, "Failed to publish node status event");
        }
    }

    fn count(&self, operation: &'static str, result: &'static str) {
        metrics::node_forward_total().add(
            1,
            &[
                KeyValue::new("operation", operation),
                KeyValue::new("result", result),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::scopes;
    use crate::federation::transport::TransportError;
    use crate::resilience::{CircuitBreakerConfig, HealthScoringConfig};
    use crate::store::{HealthStore, InMemoryHealthStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct FlakyTransport {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl NodeTransport for FlakyTransport {
        async fn send(&self, node: &Node, request: &NodeRequest) -> Result<Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                Err(TransportError::Status {
                    status: 503,
                    body: "down".to_string(),
                })
            } else {
                Ok(json!({"node": node.slug, "operation": request.operation()}))
            }
        }
    }

    fn forwarder(transport: Arc<FlakyTransport>, threshold: u32) -> NodeForwarder {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryHealthStore::new());
        let breaker = CircuitBreaker::new(
            scopes::NODE,
            Arc::clone(&store),
            CircuitBreakerConfig {
                failure_threshold: threshold,
                ..Default::default()
            },
        );
        let health = HealthTracker::new(scopes::NODE, store, HealthScoringConfig::default());
        NodeForwarder::new(
            Arc::new(NodeRegistry::new()),
            transport,
            breaker,
            health,
            EventPublisher::new(16),
        )
    }

    #[tokio::test]
    async fn test_successful_forward_records_health() {
        let transport = Arc::new(FlakyTransport::default());
        let forwarder = forwarder(Arc::clone(&transport), 3);
        let node = forwarder.registry().register(Node::new("alpha", "http://alpha")).unwrap();

        let result = forwarder.forward_search(&node, json!({"q": "x"})).await;
        assert!(result.success);
        assert!(result.attempted);
        assert_eq!(result.payload.unwrap()["operation"], "search");

        let record = forwarder.health().get(&node.identity()).await.unwrap().unwrap();
        assert_eq!(record.success_count, 1);
        assert_eq!(forwarder.registry().in_flight(&node.id), 0);
    }

    #[tokio::test]
    async fn test_inactive_node_is_refused_without_network() {
        let transport = Arc::new(FlakyTransport::default());
        let forwarder = forwarder(Arc::clone(&transport), 3);
        let node = forwarder
            .registry()
            .register(Node::new("alpha", "http://alpha").with_status(NodeStatus::Inactive))
            .unwrap();

        let result = forwarder.forward_action(&node, "sync", json!({})).await;
        assert!(!result.success);
        assert!(!result.attempted);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_circuit_refuses_calls() {
        let transport = Arc::new(FlakyTransport {
            fail: true,
            ..Default::default()
        });
        let forwarder = forwarder(Arc::clone(&transport), 2);
        let node = forwarder.registry().register(Node::new("alpha", "http://alpha")).unwrap();

        for _ in 0..2 {
            let result = forwarder.forward_search(&node, json!({})).await;
            assert!(result.attempted);
            assert!(result.error.unwrap().contains("503"));
        }
        assert!(!forwarder.is_eligible(&node).await);

        let refused = forwarder.forward_search(&node, json!({})).await;
        assert!(!refused.attempted);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let transport = Arc::new(FlakyTransport {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let forwarder = forwarder(transport, 3).with_timeout(Duration::from_millis(20));
        let node = forwarder.registry().register(Node::new("alpha", "http://alpha")).unwrap();

        let result = forwarder.forward_search(&node, json!({})).await;
        assert!(result.attempted);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert_eq!(
            forwarder.breaker().status(&node.identity()).await.unwrap().failure_count,
            1
        );
    }

    #[tokio::test]
    async fn test_ping_flips_status_but_not_inactive() {
        let transport = Arc::new(FlakyTransport {
            fail: true,
            ..Default::default()
        });
        let forwarder = forwarder(transport, 3);
        let active = forwarder.registry().register(Node::new("alpha", "http://alpha")).unwrap();
        let disabled = forwarder
            .registry()
            .register(Node::new("beta", "http://beta").with_status(NodeStatus::Inactive))
            .unwrap();

        let results = forwarder.ping_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.reachable));

        assert_eq!(forwarder.registry().get(&active.id).unwrap().status, NodeStatus::Error);
        assert_eq!(
            forwarder.registry().get(&disabled.id).unwrap().status,
            NodeStatus::Inactive
        );
        assert!(forwarder.registry().get(&active.id).unwrap().last_ping_at.is_some());
    }

    #[tokio::test]
    async fn test_ping_restores_error_node() {
        let transport = Arc::new(FlakyTransport::default());
        let forwarder = forwarder(transport, 3);
        let node = forwarder
            .registry()
            .register(Node::new("alpha", "http://alpha").with_status(NodeStatus::Error))
            .unwrap();

        let result = forwarder.ping(&node).await;
        assert!(result.reachable);
        assert_eq!(result.status, NodeStatus::Active);
        assert!(forwarder.registry().get(&node.id).unwrap().response_time_ms.is_some());
    }
}
