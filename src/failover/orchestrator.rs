//! # Failover Orchestrator
//!
//! Drives one logical request across interchangeable candidates. The order is
//! recomputed on every call from the current health snapshot; circuit-open
//! candidates are skipped without an attempt; the first success wins.
//!
//! The orchestrator itself keeps no state between calls. Everything it learns
//! is written back through the circuit breaker and the health tracker.

use opentelemetry::KeyValue;
use serde_json::json;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::{Candidate, FailoverError, OrderingStrategy};
use crate::constants::{defaults, events};
use crate::events::EventPublisher;
use crate::logging::log_failover_attempt;
use crate::metrics;
use crate::resilience::{CircuitBreaker, HealthTracker};

/// Per-call knobs
#[derive(Debug, Clone, Default)]
pub struct FailoverOptions {
    /// Cap on attempted candidates; defaults to every ordered candidate
    pub max_attempts: Option<usize>,
    /// Bound on a single attempt; defaults to the orchestrator's timeout
    pub attempt_timeout: Option<Duration>,
}

impl FailoverOptions {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }
}

/// Successful result of a failover run
#[derive(Debug, Clone)]
pub struct FailoverOutcome<T> {
    pub value: T,
    pub candidate_id: String,
    /// Attempts made, including the successful one
    pub attempt_count: usize,
    /// Candidates passed over because their circuit was open
    pub skipped: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct FailoverOrchestrator {
    breaker: CircuitBreaker,
    health: HealthTracker,
    events: EventPublisher,
    default_strategy: OrderingStrategy,
    attempt_timeout: Duration,
}

impl FailoverOrchestrator {
    pub fn new(
        breaker: CircuitBreaker,
        health: HealthTracker,
        events: EventPublisher,
        default_strategy: OrderingStrategy,
    ) -> Self {
        Self {
            breaker,
            health,
            events,
            default_strategy,
            attempt_timeout: Duration::from_millis(defaults::ATTEMPT_TIMEOUT_MS),
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn default_strategy(&self) -> &OrderingStrategy {
        &self.default_strategy
    }

    /// Run `unit_of_work` against candidates until one succeeds.
    ///
    /// Candidates whose circuit is open are skipped and do not count toward
    /// `max_attempts`. A timed-out attempt counts as a failure. When every
    /// candidate has failed or been skipped the aggregated error carries the
    /// last failure and the number of attempts made.
    pub async fn execute_with_failover<T, E, F, Fut>(
        &self,
        candidates: &[Candidate],
        strategy: Option<&OrderingStrategy>,
        options: FailoverOptions,
        mut unit_of_work: F,
    ) -> Result<FailoverOutcome<T>, FailoverError>
    where
        F: FnMut(Candidate) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if candidates.is_empty() {
            return Err(FailoverError::NoCandidates);
        }

        let strategy = strategy.unwrap_or(&self.default_strategy);
        let started = Instant::now();
        let snapshot = self
            .health
            .snapshot(candidates.iter().map(|c| c.id.as_str()))
            .await;
        let ordered = strategy.order(candidates, &snapshot).await;
        let max_attempts = options.max_attempts.unwrap_or(ordered.len());
        let attempt_timeout = options.attempt_timeout.unwrap_or(self.attempt_timeout);

        debug!(
            strategy = strategy.name(),
            candidates = ordered.len(),
            max_attempts = max_attempts,
            "Starting failover execution"
        );

        let mut attempts = 0usize;
        let mut skipped = 0usize;
        let mut last_error: Option<String> = None;

        for candidate in ordered.iter() {
            if attempts >= max_attempts {
                break;
            }

            if self.breaker.is_open(&candidate.id).await {
                skipped += 1;
                debug!(candidate = %candidate.id, "Circuit open, skipping candidate");
                continue;
            }

            attempts += 1;
            let attempt_started = Instant::now();
            let outcome = tokio::time::timeout(attempt_timeout, unit_of_work(candidate.clone())).await;
            let elapsed = attempt_started.elapsed();
            let elapsed_ms = elapsed.as_millis() as u64;

            let failure = match outcome {
                Ok(Ok(value)) => {
                    self.breaker.record_success(&candidate.id).await;
                    self.health.record_success(&candidate.id, elapsed).await;
                    self.count_attempt(&candidate.id, "success");
                    log_failover_attempt(&candidate.id, attempts, "success", Some(elapsed_ms), None);

                    if attempts > 1 || skipped > 0 {
                        info!(
                            candidate = %candidate.id,
                            attempt_count = attempts,
                            skipped = skipped,
                            "Failover succeeded on alternate candidate"
                        );
                    }

                    return Ok(FailoverOutcome {
                        value,
                        candidate_id: candidate.id.clone(),
                        attempt_count: attempts,
                        skipped,
                        elapsed: started.elapsed(),
                    });
                }
                Ok(Err(e)) => {
                    self.count_attempt(&candidate.id, "failure");
                    e.to_string()
                }
                Err(_) => {
                    self.count_attempt(&candidate.id, "timeout");
                    format!("attempt timed out after {}ms", attempt_timeout.as_millis())
                }
            };

            self.breaker.record_failure(&candidate.id).await;
            self.health.record_failure(&candidate.id, &failure).await;
            log_failover_attempt(&candidate.id, attempts, "failure", Some(elapsed_ms), Some(failure.as_str()));
            last_error = Some(failure);
        }

        let error = FailoverError::AllCandidatesFailed {
            attempts,
            skipped,
            last_error,
        };
        self.report_exhausted(strategy, &ordered, &error, started.elapsed())
            .await;
        Err(error)
    }

    fn count_attempt(&self, candidate: &str, result: &'static str) {
        metrics::failover_attempts_total().add(
            1,
            &[
                KeyValue::new("candidate", candidate.to_string()),
                KeyValue::new("result", result),
            ],
        );
    }

    async fn report_exhausted(
        &self,
        strategy: &OrderingStrategy,
        ordered: &[Candidate],
        failure: &FailoverError,
        elapsed: Duration,
    ) {
        metrics::failover_exhausted_total().add(1, &[KeyValue::new("strategy", strategy.name())]);

        let (attempts, skipped, last_error) = match failure {
            FailoverError::AllCandidatesFailed {
                attempts,
                skipped,
                last_error,
            } => (*attempts, *skipped, last_error.clone()),
            _ => (0, 0, None),
        };

        error!(
            strategy = strategy.name(),
            attempts = attempts,
            skipped = skipped,
            elapsed_ms = elapsed.as_millis() as u64,
            last_error = last_error.as_deref().unwrap_or("none"),
            "❌ All failover candidates exhausted"
        );

        let context = json!({
            "strategy": strategy.name(),
            "candidates": ordered.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            "attempts": attempts,
            "skipped": skipped,
            "last_error": last_error,
            "elapsed_ms": elapsed.as_millis() as u64,
        });
        if let Err(e) = self.events.publish(events::SYSTEM_FAILURE, context).await {
            debug!(error = %e, "Failed to publish system failure event");
        }
    }
}
