#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

//! # Federation Core
//!
//! Reliability layer for applications that depend on interchangeable external
//! providers and on peer application instances ("nodes").
//!
//! ## Overview
//!
//! - **Provider failover**: an ordered list of candidates is tried until one
//!   succeeds, skipping candidates whose circuit breaker is open and ranking
//!   the rest by health score and configured priority (or round-robin).
//! - **Node federation**: searches and actions are forwarded to remote nodes
//!   behind the same breaker, with load-balanced node selection, broadcast
//!   fan-out, and saga-style multi-node transactions with reverse rollback.
//! - **Node server**: an axum API through which peers register, authenticate
//!   (signed token or static key), and call into this instance under a
//!   per-node fixed-window rate limit.
//!
//! All breaker, health, cursor, and rate-window state lives in a shared
//! [`HealthStore`](store::HealthStore) so that every process of a deployment
//! observes the same circuit.
//!
//! ## Module Organization
//!
//! - [`store`] - shared TTL key-value state with atomic updates
//! - [`resilience`] - circuit breaker and health tracking
//! - [`failover`] - candidates, ordering strategies, the failover orchestrator
//! - [`federation`] - nodes, registry, auth, forwarding, coordination, balancing
//! - [`web`] - node server
//! - [`context`] - wiring of all of the above from configuration
//! - [`config`] - layered configuration loading and validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use federation_core::config::FederationConfig;
//! use federation_core::context::FederationContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = FederationConfig::default();
//! config.federation.auth.signing_secret = "change-me".to_string();
//! let context = FederationContext::new(config)?;
//!
//! let candidates = context.candidates(["openai", "anthropic"]);
//! let outcome = context
//!     .execute_with_failover(&candidates, None, None, |candidate| async move {
//!         if candidate.id == "openai" {
//!             Err("quota exceeded")
//!         } else {
//!             Ok(format!("answered by {}", candidate.id))
//!         }
//!     })
//!     .await?;
//! println!("{} after {} attempts", outcome.value, outcome.attempt_count);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod events;
pub mod failover;
pub mod federation;
pub mod logging;
pub mod metrics;
pub mod resilience;
pub mod store;
pub mod web;

pub use config::{ConfigManager, ConfigurationError, FederationConfig};
pub use context::FederationContext;
pub use error::{FederationError, Result};
pub use events::{EventPublisher, PublishedEvent};
pub use failover::{
    Candidate, FailoverError, FailoverOptions, FailoverOrchestrator, FailoverOutcome,
    OrderingStrategy,
};
pub use federation::{
    LoadBalancer, Node, NodeAuthenticator, NodeForwarder, NodeRegistry, NodeStatus,
    RemoteActionCoordinator, SelectionStrategy, TransactionPlan, TransactionResult,
    TransactionStep,
};
pub use resilience::{CircuitBreaker, CircuitState, HealthTracker};
pub use store::{HealthStore, InMemoryHealthStore};
