//! # Ordering Strategies
//!
//! Turn a candidate list plus a health snapshot into the order in which the
//! orchestrator attempts them. The set is closed: [`OrderingStrategy`] is
//! either priority-weighted or round-robin, selected by name from config.

use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Candidate, FailoverError};
use crate::constants::{keys, scoring};
use crate::resilience::HealthSnapshot;
use crate::store::{self, HealthStore};

pub const PRIORITY: &str = "priority";
pub const ROUND_ROBIN: &str = "round_robin";

/// Blend of health and static priority, highest first. Stateless.
#[derive(Debug, Clone, Default)]
pub struct PriorityStrategy;

impl PriorityStrategy {
    pub fn score(candidate: &Candidate, health: &HealthSnapshot) -> f64 {
        scoring::PRIORITY_HEALTH_WEIGHT * health.score(&candidate.id)
            + scoring::PRIORITY_WEIGHT * (f64::from(candidate.priority.min(100)) / 100.0)
    }

    pub fn order(&self, candidates: &[Candidate], health: &HealthSnapshot) -> Vec<Candidate> {
        let mut scored: Vec<(f64, &Candidate)> = candidates
            .iter()
            .map(|c| (Self::score(c, health), c))
            .collect();
        // sort_by is stable, so equal scores keep their input order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        scored.into_iter().map(|(_, c)| c.clone()).collect()
    }
}

/// Rotates through healthy candidates using a cursor persisted in the store
#[derive(Debug, Clone)]
pub struct RoundRobinStrategy {
    store: Arc<dyn HealthStore>,
    instance_key: String,
    min_health: f64,
}

impl RoundRobinStrategy {
    pub fn new(store: Arc<dyn HealthStore>, instance_key: impl Into<String>, min_health: f64) -> Self {
        Self {
            store,
            instance_key: instance_key.into(),
            min_health: min_health.clamp(0.0, 1.0),
        }
    }

    fn cursor_key(&self) -> String {
        format!("{}:{}", keys::ROUND_ROBIN_CURSOR, self.instance_key)
    }

    /// Claim the current cursor position and advance it by one
    async fn claim_cursor(&self, len: usize) -> usize {
        let len = len as u64;
        let mut claimed = 0u64;

        let result = store::update(
            self.store.as_ref(),
            &self.cursor_key(),
            |current: Option<u64>| {
                claimed = current.unwrap_or(0) % len;
                (claimed + 1) % len
            },
            |_| None,
        )
        .await;

        match result {
            Ok(_) => claimed as usize,
            Err(e) => {
                warn!(instance = %self.instance_key, error = %e, "Round-robin cursor unavailable, starting from head");
                0
            }
        }
    }

    pub async fn order(&self, candidates: &[Candidate], health: &HealthSnapshot) -> Vec<Candidate> {
        let healthy: Vec<Candidate> = candidates
            .iter()
            .filter(|c| health.score(&c.id) >= self.min_health)
            .cloned()
            .collect();

        let mut rotation = if healthy.is_empty() {
            debug!(
                instance = %self.instance_key,
                candidates = candidates.len(),
                "No candidate above health floor, rotating over all candidates"
            );
            candidates.to_vec()
        } else {
            healthy
        };

        if rotation.is_empty() {
            return rotation;
        }

        let cursor = self.claim_cursor(rotation.len()).await;
        rotation.rotate_left(cursor);
        rotation
    }
}

/// Closed set of ordering strategies
#[derive(Debug, Clone)]
pub enum OrderingStrategy {
    Priority(PriorityStrategy),
    RoundRobin(RoundRobinStrategy),
}

impl OrderingStrategy {
    pub fn priority() -> Self {
        OrderingStrategy::Priority(PriorityStrategy)
    }

    pub fn round_robin(
        store: Arc<dyn HealthStore>,
        instance_key: impl Into<String>,
        min_health: f64,
    ) -> Self {
        OrderingStrategy::RoundRobin(RoundRobinStrategy::new(store, instance_key, min_health))
    }

    /// Resolve a configured strategy name
    pub fn from_name(
        name: &str,
        store: Arc<dyn HealthStore>,
        instance_key: &str,
        min_health: f64,
    ) -> Result<Self, FailoverError> {
        match name {
            PRIORITY => Ok(Self::priority()),
            ROUND_ROBIN | "round-robin" | "roundrobin" => {
                Ok(Self::round_robin(store, instance_key, min_health))
            }
            other => Err(FailoverError::UnknownStrategy(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderingStrategy::Priority(_) => PRIORITY,
            OrderingStrategy::RoundRobin(_) => ROUND_ROBIN,
        }
    }

    pub async fn order(&self, candidates: &[Candidate], health: &HealthSnapshot) -> Vec<Candidate> {
        match self {
            OrderingStrategy::Priority(strategy) => strategy.order(candidates, health),
            OrderingStrategy::RoundRobin(strategy) => strategy.order(candidates, health).await,
        }
    }
}
