//! # Provider Failover
//!
//! Routes one logical request across interchangeable providers. Candidates
//! are ordered by an [`OrderingStrategy`], gated by the provider-scope circuit
//! breaker, and attempted by the [`FailoverOrchestrator`] until one succeeds.

pub mod candidate;
pub mod orchestrator;
pub mod strategy;

use thiserror::Error;

pub use candidate::{Candidate, ProviderPriorityTable};
pub use orchestrator::{FailoverOptions, FailoverOrchestrator, FailoverOutcome};
pub use strategy::{OrderingStrategy, PriorityStrategy, RoundRobinStrategy};

#[derive(Debug, Clone, Error)]
pub enum FailoverError {
    #[error("No candidates supplied for failover")]
    NoCandidates,
    #[error("Unknown ordering strategy: {0}")]
    UnknownStrategy(String),
    #[error(
        "All candidates failed after {attempts} attempts ({skipped} skipped): {}",
        .last_error.as_deref().unwrap_or("no candidate was attempted")
    )]
    AllCandidatesFailed {
        attempts: usize,
        skipped: usize,
        last_error: Option<String>,
    },
}
