//! # Resilience Module
//!
//! Circuit breakers and health tracking shared by provider failover and node
//! federation. Both are keyed by `(scope, identity)` in the shared
//! [`HealthStore`](crate::store::HealthStore), so one mechanism handles
//! failures for providers and remote nodes alike.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use federation_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
//! use federation_core::store::{HealthStore, InMemoryHealthStore};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store: Arc<dyn HealthStore> = Arc::new(InMemoryHealthStore::new());
//! let breaker = CircuitBreaker::new("provider", store, CircuitBreakerConfig::default());
//!
//! if !breaker.is_open("openai").await {
//!     // attempt the call, then report the outcome
//!     breaker.record_success("openai").await;
//! }
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod health;

pub use circuit_breaker::{CircuitBreaker, CircuitRecord, CircuitState};
pub use config::{CircuitBreakerConfig, HealthScoringConfig};
pub use health::{HealthRecord, HealthSnapshot, HealthTracker};
