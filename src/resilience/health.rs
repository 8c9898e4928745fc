//! # Health Tracking
//!
//! Per-identity success/failure accounting with a normalized health score used
//! by the ordering strategies. Records live in the shared [`HealthStore`] and
//! expire after `record_ttl` without updates.
//!
//! ```text
//! score = clamp(0.6 * success_rate + 0.4 * response_time_score - penalty, 0, 1)
//! ```
//!
//! `response_time_score` falls linearly from 1 at 0 ms to 0 at the configured
//! ceiling. `penalty` is the recent-failure penalty decayed linearly over the
//! penalty window since the last failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{keys, scoring};
use crate::resilience::HealthScoringConfig;
use crate::store::{self, HealthStore, StoreResult};

/// Observed health of one provider or node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub identity: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub total_requests: u64,
    /// Running mean over successful calls
    pub avg_response_time_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub health_score: f64,
}

impl HealthRecord {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            success_count: 0,
            failure_count: 0,
            total_requests: 0,
            avg_response_time_ms: 0.0,
            last_success_at: None,
            last_failure_at: None,
            last_error: None,
            health_score: 1.0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.success_count as f64 / self.total_requests as f64
        }
    }

    /// Health score as of `now`
    pub fn compute_score(&self, scoring_config: &HealthScoringConfig, now: DateTime<Utc>) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }

        let ceiling_ms = scoring_config.response_time_ceiling.as_secs_f64() * 1000.0;
        let response_time_score = if ceiling_ms > 0.0 {
            1.0 - (self.avg_response_time_ms.min(ceiling_ms) / ceiling_ms)
        } else {
            1.0
        };

        let penalty = match self.last_failure_at {
            Some(failed_at) => {
                let age = (now - failed_at).to_std().unwrap_or(Duration::ZERO);
                let window = scoring_config.penalty_window.as_secs_f64();
                if window > 0.0 && age < scoring_config.penalty_window {
                    scoring_config.recent_failure_penalty * (1.0 - age.as_secs_f64() / window)
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        let raw = scoring::SUCCESS_RATE_WEIGHT * self.success_rate()
            + scoring::RESPONSE_TIME_WEIGHT * response_time_score
            - penalty;
        raw.clamp(0.0, 1.0)
    }
}

/// Point-in-time view of health scores, handed to ordering strategies
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    scores: HashMap<String, f64>,
}

impl HealthSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scores<I, S>(scores: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            scores: scores
                .into_iter()
                .map(|(id, score)| (id.into(), score.clamp(0.0, 1.0)))
                .collect(),
        }
    }

    pub fn insert(&mut self, identity: impl Into<String>, score: f64) {
        self.scores.insert(identity.into(), score.clamp(0.0, 1.0));
    }

    /// Score for an identity; unknown identities are optimistically healthy
    pub fn score(&self, identity: &str) -> f64 {
        self.scores.get(identity).copied().unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Store-backed health accounting for one scope
#[derive(Debug, Clone)]
pub struct HealthTracker {
    scope: String,
    store: Arc<dyn HealthStore>,
    scoring: HealthScoringConfig,
}

impl HealthTracker {
    pub fn new(
        scope: impl Into<String>,
        store: Arc<dyn HealthStore>,
        scoring: HealthScoringConfig,
    ) -> Self {
        Self {
            scope: scope.into(),
            store,
            scoring,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn scoring(&self) -> &HealthScoringConfig {
        &self.scoring
    }

    fn key(&self, identity: &str) -> String {
        keys::scoped(keys::HEALTH, &self.scope, identity)
    }

    /// Record a successful call and its latency
    pub async fn record_success(&self, identity: &str, elapsed: Duration) {
        let scoring_config = self.scoring.clone();
        let ttl = Some(self.scoring.record_ttl);
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        let result = store::update(
            self.store.as_ref(),
            &self.key(identity),
            |current: Option<HealthRecord>| {
                let mut record = current.unwrap_or_else(|| HealthRecord::new(identity));
                let now = Utc::now();
                record.success_count += 1;
                record.total_requests += 1;
                record.avg_response_time_ms += (elapsed_ms - record.avg_response_time_ms)
                    / record.success_count as f64;
                record.last_success_at = Some(now);
                record.health_score = record.compute_score(&scoring_config, now);
                record
            },
            |_| ttl,
        )
        .await;

        match result {
            Ok(record) => debug!(
                scope = %self.scope,
                identity = %identity,
                elapsed_ms = elapsed_ms,
                health_score = record.health_score,
                "Health success recorded"
            ),
            Err(e) => warn!(scope = %self.scope, identity = %identity, error = %e, "Failed to record health success"),
        }
    }

    /// Record a failed call and its error message
    pub async fn record_failure(&self, identity: &str, error_message: &str) {
        let scoring_config = self.scoring.clone();
        let ttl = Some(self.scoring.record_ttl);

        let result = store::update(
            self.store.as_ref(),
            &self.key(identity),
            |current: Option<HealthRecord>| {
                let mut record = current.unwrap_or_else(|| HealthRecord::new(identity));
                let now = Utc::now();
                record.failure_count += 1;
                record.total_requests += 1;
                record.last_failure_at = Some(now);
                record.last_error = Some(error_message.to_string());
                record.health_score = record.compute_score(&scoring_config, now);
                record
            },
            |_| ttl,
        )
        .await;

        match result {
            Ok(record) => debug!(
                scope = %self.scope,
                identity = %identity,
                health_score = record.health_score,
                error = %error_message,
                "Health failure recorded"
            ),
            Err(e) => warn!(scope = %self.scope, identity = %identity, error = %e, "Failed to record health failure"),
        }
    }

    /// Stored record with its score refreshed to the current time
    pub async fn get(&self, identity: &str) -> StoreResult<Option<HealthRecord>> {
        let record = store::load::<HealthRecord>(self.store.as_ref(), &self.key(identity)).await?;
        Ok(record.map(|mut record| {
            record.health_score = record.compute_score(&self.scoring, Utc::now());
            record
        }))
    }

    /// Every live record in this scope
    pub async fn all(&self) -> StoreResult<Vec<HealthRecord>> {
        let prefix = format!("{}:{}:", keys::HEALTH, self.scope);
        let now = Utc::now();
        let mut records = Vec::new();
        for key in self.store.keys_with_prefix(&prefix).await? {
            if let Some(mut record) = store::load::<HealthRecord>(self.store.as_ref(), &key).await? {
                record.health_score = record.compute_score(&self.scoring, now);
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Scores for the given identities. Unreadable records count as unknown.
    pub async fn snapshot<'a, I>(&self, identities: I) -> HealthSnapshot
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut snapshot = HealthSnapshot::new();
        for identity in identities {
            match self.get(identity).await {
                Ok(Some(record)) => snapshot.insert(identity, record.health_score),
                Ok(None) => {}
                Err(e) => {
                    warn!(scope = %self.scope, identity = %identity, error = %e, "Health record unreadable, assuming healthy");
                }
            }
        }
        snapshot
    }
}
