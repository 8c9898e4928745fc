//! Node-to-node calls over real HTTP between two in-process nodes.

mod common;

use common::{dead_url, memory_store, test_config, MockTransport, RecordingHandler, TestNodeServer, WebTestClient};
use federation_core::context::FederationContext;
use federation_core::federation::{
    CoordinatorError, Node, NodeStatus, SelectionStrategy, StepState, TransactionPlan, TransactionStep,
};
use serde_json::{json, Value};
use std::sync::Arc;

struct Federation {
    alpha: Arc<FederationContext>,
    beta_server: TestNodeServer,
    beta_handler: Arc<RecordingHandler>,
}

/// `alpha` registers with `beta` and records beta's address with the issued key
async fn federate() -> Federation {
    let alpha = Arc::new(FederationContext::new(test_config()).unwrap());
    let beta = Arc::new(FederationContext::new(test_config()).unwrap());
    let beta_handler = RecordingHandler::new("beta");
    let beta_server = TestNodeServer::start(beta, beta_handler.clone()).await.unwrap();

    let response = WebTestClient::for_server(&beta_server)
        .register("alpha", "http://alpha.internal", None)
        .await;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let credential = body["credential"].as_str().unwrap();

    alpha
        .register_node(
            Node::new("beta", &beta_server.base_url)
                .with_credential(credential)
                .with_capabilities(["search", "actions"]),
        )
        .unwrap();

    Federation {
        alpha,
        beta_server,
        beta_handler,
    }
}

#[tokio::test]
async fn test_action_and_search_round_trip() {
    let federation = federate().await;

    let echoed = federation
        .alpha
        .execute_on("beta", "echo", json!({"order": 42}))
        .await
        .unwrap();
    assert_eq!(echoed, json!({"order": 42}));

    let found = federation
        .alpha
        .coordinator()
        .search_on("beta", json!({"q": "widgets"}))
        .await
        .unwrap();
    assert_eq!(found["node"], "beta");
    assert_eq!(found["query"]["q"], "widgets");

    assert_eq!(federation.beta_handler.calls(), vec!["alpha:echo", "alpha:search"]);
    federation.beta_server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ping_records_latency() {
    let federation = federate().await;
    let beta = federation.alpha.registry().find("beta").unwrap();
    assert!(beta.last_ping_at.is_none());

    let ping = federation.alpha.forwarder().ping(&beta).await;
    assert!(ping.reachable);
    assert_eq!(ping.status, NodeStatus::Active);

    let beta = federation.alpha.registry().find("beta").unwrap();
    assert!(beta.last_ping_at.is_some());
    assert!(beta.response_time_ms.is_some());
    federation.beta_server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_step_rolls_back_committed_steps() {
    let federation = federate().await;

    let plan = TransactionPlan::default()
        .step(TransactionStep::new("beta", "reserve", json!({"sku": "A1"})).with_rollback("release", json!({"sku": "A1"})))
        .step(TransactionStep::new("beta", "fail", json!({})))
        .step(TransactionStep::new("beta", "ship", json!({})));

    let result = federation.alpha.execute_transaction(plan).await;

    assert!(!result.success);
    assert_eq!(result.failed_step, Some(1));
    assert_eq!(result.state_of(0), Some(StepState::RolledBack));
    assert_eq!(result.state_of(1), Some(StepState::Failed));
    assert_eq!(result.state_of(2), Some(StepState::Skipped));
    assert!(result.error.unwrap().contains("beta"));
    assert_eq!(
        federation.beta_handler.calls(),
        vec!["alpha:reserve", "alpha:fail", "alpha:release"]
    );
    federation.beta_server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unreachable_node_trips_circuit_without_local_fallback() {
    let alpha = FederationContext::new(test_config()).unwrap();
    let ghost = alpha
        .register_node(Node::new("ghost", dead_url().await))
        .unwrap();

    for _ in 0..2 {
        let result = alpha.execute_on("ghost", "echo", json!({})).await;
        assert!(matches!(result, Err(CoordinatorError::NodeUnreachable { .. })));
    }

    let refused = alpha.execute_on("ghost", "echo", json!({})).await;
    assert!(matches!(refused, Err(CoordinatorError::NodeUnavailable { .. })));

    let ping = alpha.forwarder().ping(&ghost).await;
    assert!(!ping.reachable);
    assert_eq!(ping.status, NodeStatus::Error);
    assert_eq!(alpha.registry().find("ghost").unwrap().status, NodeStatus::Error);

    assert!(matches!(
        alpha.execute_on("nobody", "echo", json!({})).await,
        Err(CoordinatorError::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn test_broadcast_isolates_failing_nodes() {
    let federation = federate().await;
    federation
        .alpha
        .register_node(Node::new("ghost", dead_url().await))
        .unwrap();

    let broadcast = federation
        .alpha
        .execute_on_all("invalidate_cache", json!({"key": "catalog"}), true)
        .await;

    assert_eq!(broadcast.succeeded, 1);
    assert_eq!(broadcast.failed, 1);
    assert!(broadcast.skipped.is_empty());
    let beta = broadcast.results.iter().find(|r| r.node_slug == "beta").unwrap();
    assert!(beta.success);
    assert_eq!(beta.payload.as_ref().unwrap()["action"], "invalidate_cache");
    federation.beta_server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_selection_skips_nodes_with_open_circuit() {
    let transport = MockTransport::new();
    let context = common::context_with(test_config(), memory_store(), transport.clone());
    for slug in ["n1", "n2", "n3"] {
        context
            .register_node(Node::new(slug, format!("http://{slug}.internal")))
            .unwrap();
    }

    transport.fail("n1:search");
    let n1 = context.registry().find("n1").unwrap();
    for _ in 0..2 {
        assert!(!context.forwarder().forward_search(&n1, json!({})).await.success);
    }

    let pool = context.registry().list();
    for strategy in [
        SelectionStrategy::ResponseTime,
        SelectionStrategy::LeastConnections,
        SelectionStrategy::Weighted,
    ] {
        let selected = context.select_nodes(&pool, 3, strategy).await;
        let slugs: Vec<&str> = selected.iter().map(|n| n.slug.as_str()).collect();
        assert_eq!(selected.len(), 2, "{strategy:?} selected {slugs:?}");
        assert!(!slugs.contains(&"n1"));
    }

    let broadcast = context.execute_on_all("refresh", json!({}), false).await;
    assert_eq!(broadcast.skipped, vec!["n1"]);
    assert_eq!(broadcast.succeeded, 2);
}
