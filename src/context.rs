//! # Federation Context
//!
//! Wires every component over one shared health store and event stream, and
//! exposes the public failover and federation operations in one place.

use serde_json::Value;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::config::FederationConfig;
use crate::constants::scopes;
use crate::error::{FederationError, Result};
use crate::events::EventPublisher;
use crate::failover::{
    Candidate, FailoverError, FailoverOptions, FailoverOrchestrator, FailoverOutcome,
    OrderingStrategy, ProviderPriorityTable,
};
use crate::federation::{
    BroadcastResult, CoordinatorError, FixedWindowRateLimiter, HttpNodeTransport, LoadBalancer,
    Node, NodeAuthenticator, NodeForwarder, NodeRegistry, NodeTransport, RemoteActionCoordinator,
    SelectionStrategy, TransactionPlan, TransactionResult,
};
use crate::resilience::{CircuitBreaker, CircuitRecord, HealthRecord, HealthTracker};
use crate::store::{HealthStore, InMemoryHealthStore};

#[derive(Debug, Clone)]
pub struct FederationContext {
    config: FederationConfig,
    store: Arc<dyn HealthStore>,
    events: EventPublisher,
    orchestrator: FailoverOrchestrator,
    priority_table: ProviderPriorityTable,
    registry: Arc<NodeRegistry>,
    authenticator: NodeAuthenticator,
    coordinator: RemoteActionCoordinator,
    load_balancer: LoadBalancer,
    rate_limiter: FixedWindowRateLimiter,
}

impl FederationContext {
    /// In-memory store and HTTP transport
    pub fn new(config: FederationConfig) -> Result<Self> {
        let transport = HttpNodeTransport::new(config.node_request_timeout())?;
        Self::with_components(config, Arc::new(InMemoryHealthStore::new()), Arc::new(transport))
    }

    pub fn with_components(
        config: FederationConfig,
        store: Arc<dyn HealthStore>,
        transport: Arc<dyn NodeTransport>,
    ) -> Result<Self> {
        config.validate()?;

        let events = EventPublisher::new(config.events.channel_capacity);
        let breaker_config = config.circuit_breaker_config();
        let scoring = config.health_scoring_config();

        let provider_breaker =
            CircuitBreaker::new(scopes::PROVIDER, Arc::clone(&store), breaker_config.clone())
                .with_events(events.clone());
        let provider_health = HealthTracker::new(scopes::PROVIDER, Arc::clone(&store), scoring.clone());
        let default_strategy = OrderingStrategy::from_name(
            &config.failover.strategy,
            Arc::clone(&store),
            &config.failover.round_robin_key,
            scoring.round_robin_min_health,
        )?;
        let orchestrator =
            FailoverOrchestrator::new(provider_breaker, provider_health, events.clone(), default_strategy)
                .with_attempt_timeout(config.attempt_timeout());

        let registry = Arc::new(NodeRegistry::new());
        let authenticator = NodeAuthenticator::new(config.node_auth_config(), Arc::clone(&registry))?;

        let node_breaker = CircuitBreaker::new(scopes::NODE, Arc::clone(&store), breaker_config)
            .with_events(events.clone());
        let node_health = HealthTracker::new(scopes::NODE, Arc::clone(&store), scoring);
        let forwarder = NodeForwarder::new(
            Arc::clone(&registry),
            transport,
            node_breaker.clone(),
            node_health,
            events.clone(),
        )
        .with_timeout(config.node_request_timeout());
        let coordinator = RemoteActionCoordinator::new(forwarder, events.clone());
        let load_balancer = LoadBalancer::new(Arc::clone(&registry), node_breaker);
        let rate_limiter = FixedWindowRateLimiter::new(Arc::clone(&store), config.rate_limit_config());

        info!(
            strategy = %config.failover.strategy,
            failure_threshold = config.circuit_breaker.failure_threshold,
            "Federation context initialized"
        );

        Ok(Self {
            priority_table: config.priority_table(),
            config,
            store,
            events,
            orchestrator,
            registry,
            authenticator,
            coordinator,
            load_balancer,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn HealthStore> {
        &self.store
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn orchestrator(&self) -> &FailoverOrchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn authenticator(&self) -> &NodeAuthenticator {
        &self.authenticator
    }

    pub fn coordinator(&self) -> &RemoteActionCoordinator {
        &self.coordinator
    }

    pub fn forwarder(&self) -> &NodeForwarder {
        self.coordinator.forwarder()
    }

    pub fn load_balancer(&self) -> &LoadBalancer {
        &self.load_balancer
    }

    pub fn rate_limiter(&self) -> &FixedWindowRateLimiter {
        &self.rate_limiter
    }

    /// Candidates for the given providers using the configured priority table
    pub fn candidates<I, S>(&self, provider_ids: I) -> Vec<Candidate>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.priority_table.candidates(provider_ids)
    }

    /// Strategy by name, sharing this context's store
    pub fn strategy(&self, name: &str, instance_key: &str) -> std::result::Result<OrderingStrategy, FailoverError> {
        OrderingStrategy::from_name(
            name,
            Arc::clone(&self.store),
            instance_key,
            self.config.health.round_robin_min_health,
        )
    }

    /// Failover with configured defaults filling any unset options
    pub async fn execute_with_failover<T, E, F, Fut>(
        &self,
        candidates: &[Candidate],
        strategy: Option<&OrderingStrategy>,
        options: Option<FailoverOptions>,
        unit_of_work: F,
    ) -> std::result::Result<FailoverOutcome<T>, FailoverError>
    where
        F: FnMut(Candidate) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let mut options = options.unwrap_or_default();
        if options.max_attempts.is_none() {
            options.max_attempts = self.config.failover.max_attempts;
        }
        self.orchestrator
            .execute_with_failover(candidates, strategy, options, unit_of_work)
            .await
    }

    /// One provider's health, or every tracked provider's when `id` is `None`
    pub async fn get_provider_health(&self, id: Option<&str>) -> Result<Vec<HealthRecord>> {
        let health = self.orchestrator.health();
        match id {
            Some(id) => Ok(health.get(id).await?.into_iter().collect()),
            None => Ok(health.all().await?),
        }
    }

    /// One provider circuit, or every stored provider circuit when `id` is `None`
    pub async fn get_circuit_breaker_status(&self, id: Option<&str>) -> Result<Vec<CircuitRecord>> {
        let breaker = self.orchestrator.breaker();
        match id {
            Some(id) => Ok(vec![breaker.status(id).await?]),
            None => Ok(breaker.all_statuses().await?),
        }
    }

    pub async fn reset_circuit_breaker(&self, id: &str) -> Result<()> {
        Ok(self.orchestrator.breaker().reset(id).await?)
    }

    pub async fn execute_on(
        &self,
        node: &str,
        action: &str,
        parameters: Value,
    ) -> std::result::Result<Value, CoordinatorError> {
        self.coordinator.execute_on(node, action, parameters).await
    }

    pub async fn execute_on_all(&self, action: &str, parameters: Value, parallel: bool) -> BroadcastResult {
        self.coordinator.execute_on_all(action, parameters, parallel).await
    }

    pub async fn execute_transaction(&self, plan: TransactionPlan) -> TransactionResult {
        self.coordinator.execute_transaction(plan).await
    }

    pub async fn select_nodes(&self, pool: &[Node], count: usize, strategy: SelectionStrategy) -> Vec<Node> {
        self.load_balancer.select_nodes(pool, count, strategy).await
    }

    /// Register a node, surfacing registry errors through the crate error
    pub fn register_node(&self, node: Node) -> Result<Node> {
        self.registry.register(node).map_err(FederationError::from)
    }
}
