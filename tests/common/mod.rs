//! Shared fixtures for integration tests: an in-process node server, a
//! scripted transport, and a recording local handler.

#![allow(dead_code)]

use async_trait::async_trait;
use federation_core::config::FederationConfig;
use federation_core::context::FederationContext;
use federation_core::federation::{Node, NodeRequest, NodeTransport, TransportError};
use federation_core::store::{HealthStore, InMemoryHealthStore};
use federation_core::web::{create_app, AppState, LocalHandlerError, LocalNodeHandler};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TEST_SECRET: &str = "integration-test-secret";

/// Valid configuration with a low breaker threshold for fast tests
pub fn test_config() -> FederationConfig {
    let mut config = FederationConfig::default();
    config.federation.auth.signing_secret = TEST_SECRET.to_string();
    config.circuit_breaker.failure_threshold = 2;
    config.federation.request_timeout_ms = 2_000;
    config
}

pub fn context_with(
    config: FederationConfig,
    store: Arc<dyn HealthStore>,
    transport: Arc<dyn NodeTransport>,
) -> Arc<FederationContext> {
    Arc::new(FederationContext::with_components(config, store, transport).expect("valid test config"))
}

pub fn memory_store() -> Arc<dyn HealthStore> {
    Arc::new(InMemoryHealthStore::new())
}

/// An address nothing listens on
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let address = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{address}")
}

/// axum node server bound to an ephemeral localhost port
pub struct TestNodeServer {
    pub address: SocketAddr,
    pub base_url: String,
    pub state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestNodeServer {
    pub async fn start(
        context: Arc<FederationContext>,
        handler: Arc<dyn LocalNodeHandler>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;
        let state = AppState::new(context, handler);
        let app = create_app(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        Ok(Self {
            address,
            base_url: format!("http://{address}"),
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn shutdown(mut self) -> Result<(), String> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(Duration::from_secs(5), &mut self.handle).await {
            Ok(joined) => joined
                .map_err(|e| e.to_string())?
                .map_err(|e| e.to_string()),
            Err(_) => {
                self.handle.abort();
                Ok(())
            }
        }
    }
}

/// Local handler that records every inbound call.
///
/// Actions: `echo` returns its parameters, `fail` errors, `relay` forwards
/// `parameters.action` to `parameters.node` through the upstream context (if
/// any), anything else succeeds with `{"action": name, "node": local slug}`.
#[derive(Debug)]
pub struct RecordingHandler {
    pub local_slug: String,
    pub calls: Mutex<Vec<String>>,
    upstream: Option<Arc<FederationContext>>,
}

impl RecordingHandler {
    pub fn new(local_slug: &str) -> Arc<Self> {
        Arc::new(Self {
            local_slug: local_slug.to_string(),
            calls: Mutex::new(Vec::new()),
            upstream: None,
        })
    }

    pub fn relaying(local_slug: &str, upstream: Arc<FederationContext>) -> Arc<Self> {
        Arc::new(Self {
            local_slug: local_slug.to_string(),
            calls: Mutex::new(Vec::new()),
            upstream: Some(upstream),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl LocalNodeHandler for RecordingHandler {
    async fn search(&self, caller: &Node, payload: Value) -> Result<Value, LocalHandlerError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{}:search", caller.slug));
        Ok(json!({
            "node": self.local_slug,
            "query": payload,
            "results": [format!("{}-result", self.local_slug)],
        }))
    }

    async fn execute_action(
        &self,
        caller: &Node,
        action: &str,
        parameters: Value,
    ) -> Result<Value, LocalHandlerError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(format!("{}:{}", caller.slug, action));
        match action {
            "echo" => Ok(parameters),
            "fail" => Err(LocalHandlerError::Failed("scripted failure".to_string())),
            "relay" => {
                let upstream = self
                    .upstream
                    .as_ref()
                    .ok_or_else(|| LocalHandlerError::BadRequest("relay not configured".to_string()))?;
                let node = parameters["node"].as_str().unwrap_or_default();
                let action = parameters["action"].as_str().unwrap_or("echo");
                Ok(upstream.execute_on(node, action, json!({})).await?)
            }
            other => Ok(json!({ "action": other, "node": self.local_slug })),
        }
    }
}

/// Transport answering from a script instead of the network.
///
/// Calls listed in `failing` (as `slug:operation` or `slug:action`) return a
/// 500; every other call succeeds with `{"node": slug}`.
#[derive(Debug, Default)]
pub struct MockTransport {
    failing: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, Value>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, call: &str) {
        self.failing.lock().expect("failing lock").push(call.to_string());
    }

    pub fn recover(&self, call: &str) {
        self.failing.lock().expect("failing lock").retain(|c| c != call);
    }

    pub fn respond(&self, call: &str, body: Value) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(call.to_string(), body);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn call_name(node: &Node, request: &NodeRequest) -> String {
        match request {
            NodeRequest::Action { action, .. } => format!("{}:{}", node.slug, action),
            other => format!("{}:{}", node.slug, other.operation()),
        }
    }
}

#[async_trait]
impl NodeTransport for MockTransport {
    async fn send(&self, node: &Node, request: &NodeRequest) -> Result<Value, TransportError> {
        let call = Self::call_name(node, request);
        self.calls.lock().expect("calls lock").push(call.clone());

        if self.failing.lock().expect("failing lock").contains(&call) {
            return Err(TransportError::Status {
                status: 500,
                body: format!("scripted failure for {call}"),
            });
        }
        let scripted = self.responses.lock().expect("responses lock").get(&call).cloned();
        Ok(scripted.unwrap_or_else(|| json!({ "node": node.slug })))
    }
}

/// Minimal reqwest wrapper for the node API
pub struct WebTestClient {
    client: reqwest::Client,
    base_url: String,
}

impl WebTestClient {
    pub fn for_server(server: &TestNodeServer) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: server.base_url.clone(),
        }
    }

    pub async fn get(&self, path: &str, credential: Option<&str>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(credential) = credential {
            request = request.bearer_auth(credential);
        }
        request.send().await.expect("request sent")
    }

    pub async fn post(&self, path: &str, credential: Option<&str>, body: Value) -> reqwest::Response {
        let mut request = self.client.post(format!("{}{}", self.base_url, path)).json(&body);
        if let Some(credential) = credential {
            request = request.bearer_auth(credential);
        }
        request.send().await.expect("request sent")
    }

    pub async fn register(&self, slug: &str, url: &str, registration_key: Option<&str>) -> reqwest::Response {
        let mut request = self
            .client
            .post(format!("{}/register", self.base_url))
            .json(&json!({ "slug": slug, "url": url, "capabilities": ["search"] }));
        if let Some(key) = registration_key {
            request = request.header("X-Registration-Key", key);
        }
        request.send().await.expect("request sent")
    }
}
