//! # Circuit Breaker Implementation
//!
//! Provides fault isolation for providers and federation nodes. This follows
//! the classic circuit breaker pattern with three states: Closed (normal
//! operation), Open (failing fast), and Half-Open (a single recovery probe).
//!
//! Unlike an in-process breaker, every circuit lives in the shared
//! [`HealthStore`], keyed by `(scope, identity)`, so all request handlers see
//! the same state. The breaker only advises: it never returns errors to the
//! caller, and store failures degrade to "closed".

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::constants::{events, keys};
use crate::events::EventPublisher;
use crate::metrics;
use crate::resilience::CircuitBreakerConfig;
use crate::store::{self, HealthStore, StoreResult};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed,
    /// Failure mode - all calls are skipped until the retry timeout elapses
    Open,
    /// Testing recovery - exactly one probe call is outstanding
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub identity: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// When the current half-open probe was granted
    pub half_open_at: Option<DateTime<Utc>>,
    pub retry_timeout_ms: u64,
    pub updated_at: DateTime<Utc>,
}

impl CircuitRecord {
    pub fn closed(identity: &str, config: &CircuitBreakerConfig) -> Self {
        Self {
            identity: identity.to_string(),
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold: config.failure_threshold,
            opened_at: None,
            half_open_at: None,
            retry_timeout_ms: config.retry_timeout.as_millis() as u64,
            updated_at: Utc::now(),
        }
    }

    fn retry_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_timeout_ms)
    }

    /// Whether the cooldown since opening has fully elapsed
    pub fn retry_timeout_elapsed(&self) -> bool {
        self.opened_at
            .is_some_and(|opened| elapsed_since(opened) >= self.retry_timeout())
    }

    /// Whether an outstanding half-open probe has been lost for a full cooldown
    fn probe_lease_expired(&self) -> bool {
        self.half_open_at
            .is_some_and(|granted| elapsed_since(granted) >= self.retry_timeout())
    }

    /// Time left before an open circuit admits a probe
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened)) => {
                Some(self.retry_timeout().saturating_sub(elapsed_since(opened)))
            }
            _ => None,
        }
    }
}

fn elapsed_since(instant: DateTime<Utc>) -> Duration {
    (Utc::now() - instant).to_std().unwrap_or(Duration::ZERO)
}

/// Store-backed circuit breaker for every identity in one scope
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Scope name (e.g. "provider", "node") for keys, logging, and metrics
    scope: String,

    store: Arc<dyn HealthStore>,

    config: CircuitBreakerConfig,

    events: Option<EventPublisher>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the given scope
    pub fn new(
        scope: impl Into<String>,
        store: Arc<dyn HealthStore>,
        config: CircuitBreakerConfig,
    ) -> Self {
        let scope = scope.into();
        info!(
            scope = %scope,
            failure_threshold = config.failure_threshold,
            retry_timeout_seconds = config.retry_timeout.as_secs(),
            state_ttl_seconds = config.state_ttl.as_secs(),
            "Circuit breaker initialized"
        );

        Self {
            scope,
            store,
            config,
            events: None,
        }
    }

    /// Publish open/close transitions on the given event stream
    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn key(&self, identity: &str) -> String {
        keys::scoped(keys::CIRCUIT, &self.scope, identity)
    }

    fn ttl_for(config: &CircuitBreakerConfig, record: &CircuitRecord) -> Option<Duration> {
        match record.state {
            CircuitState::Closed => Some(config.state_ttl),
            CircuitState::Open | CircuitState::HalfOpen => Some(config.tripped_record_ttl()),
        }
    }

    /// Whether calls to `identity` should be skipped.
    ///
    /// Once the retry timeout has elapsed on an open circuit, the first caller
    /// wins the transition to half-open and gets `false` (its call is the
    /// probe); everyone else keeps getting `true` until the probe's outcome is
    /// recorded.
    pub async fn is_open(&self, identity: &str) -> bool {
        let key = self.key(identity);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(scope = %self.scope, identity = %identity, error = %e, "Circuit state unreadable, treating as closed");
                return false;
            }
        };

        let record: CircuitRecord = match serde_json::from_value(raw.clone()) {
            Ok(record) => record,
            Err(e) => {
                warn!(scope = %self.scope, identity = %identity, error = %e, "Corrupt circuit record, treating as closed");
                return false;
            }
        };

        match record.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                if !record.retry_timeout_elapsed() {
                    return true;
                }
                let granted = self.grant_probe(&key, &raw, &record).await;
                if granted {
                    info!(
                        scope = %self.scope,
                        identity = %identity,
                        failure_count = record.failure_count,
                        "🟡 Circuit breaker half-open (testing recovery)"
                    );
                    self.count_transition(CircuitState::HalfOpen);
                }
                !granted
            }
            CircuitState::HalfOpen => {
                if !record.probe_lease_expired() {
                    return true;
                }
                let granted = self.grant_probe(&key, &raw, &record).await;
                if granted {
                    warn!(
                        scope = %self.scope,
                        identity = %identity,
                        "Half-open probe outcome never recorded, granting a new probe"
                    );
                }
                !granted
            }
        }
    }

    async fn grant_probe(
        &self,
        key: &str,
        raw: &serde_json::Value,
        record: &CircuitRecord,
    ) -> bool {
        let now = Utc::now();
        let probing = CircuitRecord {
            state: CircuitState::HalfOpen,
            half_open_at: Some(now),
            updated_at: now,
            ..record.clone()
        };
        let encoded = match serde_json::to_value(&probing) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode half-open record");
                return false;
            }
        };

        match self
            .store
            .compare_and_set(key, Some(raw), encoded, Self::ttl_for(&self.config, &probing))
            .await
        {
            Ok(won) => won,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist half-open transition");
                false
            }
        }
    }

    /// Read-only eligibility check that never consumes the half-open probe.
    ///
    /// True when closed, when open with the cooldown elapsed, or when a lost
    /// probe lease has expired.
    pub async fn allows_traffic(&self, identity: &str) -> bool {
        match store::load::<CircuitRecord>(self.store.as_ref(), &self.key(identity)).await {
            Ok(Some(record)) => match record.state {
                CircuitState::Closed => true,
                CircuitState::Open => record.retry_timeout_elapsed(),
                CircuitState::HalfOpen => record.probe_lease_expired(),
            },
            Ok(None) => true,
            Err(e) => {
                warn!(scope = %self.scope, identity = %identity, error = %e, "Circuit state unreadable, allowing traffic");
                true
            }
        }
    }

    /// Record a successful call: the circuit closes and the failure count resets
    pub async fn record_success(&self, identity: &str) {
        let config = self.config.clone();
        let mut previous = None;

        let result = store::update(
            self.store.as_ref(),
            &self.key(identity),
            |current: Option<CircuitRecord>| {
                previous = current.as_ref().map(|r| r.state);
                CircuitRecord::closed(identity, &config)
            },
            |record| Self::ttl_for(&config, record),
        )
        .await;

        match result {
            Ok(_) => {
                if matches!(previous, Some(CircuitState::Open | CircuitState::HalfOpen)) {
                    info!(
                        scope = %self.scope,
                        identity = %identity,
                        "🟢 Circuit breaker closed (recovered)"
                    );
                    self.count_transition(CircuitState::Closed);
                    self.publish(events::CIRCUIT_CLOSED, identity, 0).await;
                } else {
                    debug!(scope = %self.scope, identity = %identity, "Success recorded");
                }
            }
            Err(e) => {
                warn!(scope = %self.scope, identity = %identity, error = %e, "Failed to record circuit success");
            }
        }
    }

    /// Record a failed call.
    ///
    /// Closed circuits open once the failure count reaches the threshold. A
    /// failing half-open probe re-opens immediately and keeps counting from
    /// where it was.
    pub async fn record_failure(&self, identity: &str) {
        let config = self.config.clone();
        let mut transitioned = false;

        let result = store::update(
            self.store.as_ref(),
            &self.key(identity),
            |current: Option<CircuitRecord>| {
                let mut record = current.unwrap_or_else(|| CircuitRecord::closed(identity, &config));
                let now = Utc::now();
                record.failure_count = record.failure_count.saturating_add(1);
                record.failure_threshold = config.failure_threshold;
                record.retry_timeout_ms = config.retry_timeout.as_millis() as u64;
                record.updated_at = now;

                transitioned = match record.state {
                    CircuitState::Closed if record.failure_count >= config.failure_threshold => true,
                    CircuitState::HalfOpen => true,
                    _ => false,
                };
                if transitioned {
                    record.state = CircuitState::Open;
                    record.opened_at = Some(now);
                    record.half_open_at = None;
                }
                record
            },
            |record| Self::ttl_for(&config, record),
        )
        .await;

        match result {
            Ok(record) => {
                if transitioned {
                    error!(
                        scope = %self.scope,
                        identity = %identity,
                        failure_count = record.failure_count,
                        failure_threshold = record.failure_threshold,
                        retry_timeout_seconds = self.config.retry_timeout.as_secs(),
                        "🔴 Circuit breaker opened (failing fast)"
                    );
                    self.count_transition(CircuitState::Open);
                    self.publish(events::CIRCUIT_OPENED, identity, record.failure_count)
                        .await;
                } else {
                    debug!(
                        scope = %self.scope,
                        identity = %identity,
                        failure_count = record.failure_count,
                        state = %record.state,
                        "Failure recorded"
                    );
                }
            }
            Err(e) => {
                warn!(scope = %self.scope, identity = %identity, error = %e, "Failed to record circuit failure");
            }
        }
    }

    /// Forget all state for an identity; the next call sees a fresh closed circuit
    pub async fn reset(&self, identity: &str) -> StoreResult<()> {
        warn!(scope = %self.scope, identity = %identity, "🚨 Circuit breaker reset");
        self.store.delete(&self.key(identity)).await?;
        Ok(())
    }

    /// Current record for an identity (a fresh closed record if none is stored)
    pub async fn status(&self, identity: &str) -> StoreResult<CircuitRecord> {
        Ok(
            store::load::<CircuitRecord>(self.store.as_ref(), &self.key(identity))
                .await?
                .unwrap_or_else(|| CircuitRecord::closed(identity, &self.config)),
        )
    }

    /// Every stored circuit record in this scope
    pub async fn all_statuses(&self) -> StoreResult<Vec<CircuitRecord>> {
        let prefix = format!("{}:{}:", keys::CIRCUIT, self.scope);
        let mut records = Vec::new();
        for key in self.store.keys_with_prefix(&prefix).await? {
            if let Some(record) = store::load::<CircuitRecord>(self.store.as_ref(), &key).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn count_transition(&self, to_state: CircuitState) {
        metrics::circuit_transitions_total().add(
            1,
            &[
                KeyValue::new("scope", self.scope.clone()),
                KeyValue::new("to_state", to_state.as_str()),
            ],
        );
    }

    async fn publish(&self, event_name: &str, identity: &str, failure_count: u32) {
        if let Some(events) = &self.events {
            let context = json!({
                "scope": self.scope,
                "identity": identity,
                "failure_count": failure_count,
            });
            if let Err(e) = events.publish(event_name, context).await {
                warn!(event = %event_name, error = %e, "Failed to publish circuit event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryHealthStore;
    use proptest::prelude::*;
    use tokio::time::sleep;

    fn breaker(threshold: u32, retry_timeout: Duration) -> CircuitBreaker {
        breaker_with_state_ttl(threshold, Duration::from_secs(60), retry_timeout)
    }

    fn breaker_with_state_ttl(
        threshold: u32,
        state_ttl: Duration,
        retry_timeout: Duration,
    ) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            Arc::new(InMemoryHealthStore::new()),
            CircuitBreakerConfig {
                failure_threshold: threshold,
                state_ttl,
                retry_timeout,
            },
        )
    }

    #[tokio::test]
    async fn test_fresh_circuit_is_closed() {
        let circuit = breaker(3, Duration::from_millis(100));

        assert!(!circuit.is_open("a").await);
        assert!(circuit.allows_traffic("a").await);

        let status = circuit.status("a").await.unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test]
    async fn test_circuit_opens_at_threshold() {
        let circuit = breaker(2, Duration::from_millis(100));

        circuit.record_failure("a").await;
        assert!(!circuit.is_open("a").await);

        circuit.record_failure("a").await;
        assert!(circuit.is_open("a").await);

        let status = circuit.status("a").await.unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.failure_count, 2);
        assert!(status.opened_at.is_some());
        assert!(status.remaining_cooldown().is_some());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let circuit = breaker(3, Duration::from_millis(100));

        circuit.record_failure("a").await;
        circuit.record_failure("a").await;
        circuit.record_success("a").await;
        circuit.record_failure("a").await;

        let status = circuit.status("a").await.unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 1);
    }

    #[tokio::test]
    async fn test_half_open_grants_exactly_one_probe() {
        let circuit = breaker(1, Duration::from_millis(50));
        circuit.record_failure("a").await;

        // Polling while open never consumes the probe
        for _ in 0..5 {
            assert!(circuit.is_open("a").await);
        }

        sleep(Duration::from_millis(60)).await;
        assert!(circuit.allows_traffic("a").await);

        assert!(!circuit.is_open("a").await, "first poll after cooldown is the probe");
        assert!(circuit.is_open("a").await, "probe outstanding, others still skip");
        assert!(circuit.is_open("a").await);
        assert!(!circuit.allows_traffic("a").await);
        assert_eq!(circuit.status("a").await.unwrap().state, CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_successful_probe_closes_circuit() {
        let circuit = breaker(1, Duration::from_millis(50));
        circuit.record_failure("a").await;
        sleep(Duration::from_millis(60)).await;

        assert!(!circuit.is_open("a").await);
        circuit.record_success("a").await;

        let status = circuit.status("a").await.unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
        assert!(!circuit.is_open("a").await);
    }

    #[tokio::test]
    async fn test_failed_probe_reopens_without_resetting_count() {
        let circuit = breaker(2, Duration::from_millis(50));
        circuit.record_failure("a").await;
        circuit.record_failure("a").await;
        sleep(Duration::from_millis(60)).await;

        assert!(!circuit.is_open("a").await);
        circuit.record_failure("a").await;

        let status = circuit.status("a").await.unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.failure_count, 3);
        assert!(circuit.is_open("a").await);
    }

    #[tokio::test]
    async fn test_lost_probe_lease_is_reissued() {
        let circuit = breaker(1, Duration::from_millis(40));
        circuit.record_failure("a").await;
        sleep(Duration::from_millis(50)).await;

        assert!(!circuit.is_open("a").await);
        assert!(circuit.is_open("a").await);

        // Probe outcome never arrives
        sleep(Duration::from_millis(50)).await;
        assert!(!circuit.is_open("a").await);
        assert!(circuit.is_open("a").await);
    }

    // Default shape: the cooldown is longer than the closed-record TTL
    #[tokio::test]
    async fn test_half_open_survives_short_state_ttl() {
        let circuit =
            breaker_with_state_ttl(2, Duration::from_millis(20), Duration::from_millis(100));
        circuit.record_failure("a").await;
        circuit.record_failure("a").await;
        assert!(circuit.is_open("a").await);

        sleep(Duration::from_millis(110)).await;
        assert!(!circuit.is_open("a").await, "first poll after cooldown is the probe");
        assert!(circuit.is_open("a").await, "probe outstanding, others still skip");
        assert!(circuit.is_open("a").await);

        circuit.record_failure("a").await;
        let status = circuit.status("a").await.unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.failure_count, 3);
        assert!(circuit.is_open("a").await);
    }

    #[tokio::test]
    async fn test_lost_probe_lease_reissued_with_short_state_ttl() {
        let circuit =
            breaker_with_state_ttl(1, Duration::from_millis(10), Duration::from_millis(60));
        circuit.record_failure("a").await;
        sleep(Duration::from_millis(70)).await;

        assert!(!circuit.is_open("a").await);
        assert!(circuit.is_open("a").await);

        sleep(Duration::from_millis(70)).await;
        assert_eq!(circuit.status("a").await.unwrap().state, CircuitState::HalfOpen);
        assert!(!circuit.is_open("a").await, "expired lease grants a new probe");
        assert!(circuit.is_open("a").await);
    }

    #[tokio::test]
    async fn test_reset_and_scopes_are_isolated() {
        let store: Arc<dyn HealthStore> = Arc::new(InMemoryHealthStore::new());
        let config = CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        };
        let providers = CircuitBreaker::new("provider", Arc::clone(&store), config.clone());
        let nodes = CircuitBreaker::new("node", Arc::clone(&store), config);

        providers.record_failure("shared-id").await;
        assert!(providers.is_open("shared-id").await);
        assert!(!nodes.is_open("shared-id").await);

        assert_eq!(providers.all_statuses().await.unwrap().len(), 1);
        assert!(nodes.all_statuses().await.unwrap().is_empty());

        providers.reset("shared-id").await.unwrap();
        assert!(!providers.is_open("shared-id").await);
    }

    #[tokio::test]
    async fn test_transitions_are_published() {
        let events = EventPublisher::new(16);
        let mut receiver = events.subscribe();
        let circuit = breaker(1, Duration::from_millis(20)).with_events(events);

        circuit.record_failure("a").await;
        let opened = receiver.recv().await.unwrap();
        assert_eq!(opened.name, events::CIRCUIT_OPENED);
        assert_eq!(opened.context["identity"], "a");

        sleep(Duration::from_millis(30)).await;
        assert!(!circuit.is_open("a").await);
        circuit.record_success("a").await;
        let closed = receiver.recv().await.unwrap();
        assert_eq!(closed.name, events::CIRCUIT_CLOSED);
    }

    proptest! {
        #[test]
        fn circuit_opens_exactly_at_threshold(threshold in 1u32..12, extra in 0u32..6) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let circuit = breaker(threshold, Duration::from_secs(300));
                for n in 1..=(threshold + extra) {
                    circuit.record_failure("p").await;
                    let open = circuit.is_open("p").await;
                    prop_assert_eq!(open, n >= threshold, "after {} failures", n);
                }
                Ok(())
            })?;
        }
    }
}
