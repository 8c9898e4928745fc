//! # Federation Metrics
//!
//! OpenTelemetry counters for failover, circuit breakers, node forwarding, and
//! inbound rate limiting. Without an installed meter provider these are no-ops.
//!
//! ## Usage
//!
//! ```rust
//! use federation_core::metrics::*;
//! use opentelemetry::KeyValue;
//!
//! failover_attempts_total().add(1, &[
//!     KeyValue::new("candidate", "openai"),
//!     KeyValue::new("result", "success"),
//! ]);
//! ```

use opentelemetry::metrics::{Counter, Meter};
use std::sync::OnceLock;

/// Lazy-initialized meter for federation metrics
static FEDERATION_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    FEDERATION_METER
        .get_or_init(|| opentelemetry::global::meter_provider().meter("federation-core"))
}

/// Total unit-of-work attempts made by the failover orchestrator
///
/// Labels:
/// - candidate: candidate identity
/// - result: success, failure, timeout
pub fn failover_attempts_total() -> Counter<u64> {
    meter()
        .u64_counter("federation.failover.attempts.total")
        .with_description("Total failover attempts made against candidates")
        .build()
}

/// Total failover executions where every candidate failed or was skipped
pub fn failover_exhausted_total() -> Counter<u64> {
    meter()
        .u64_counter("federation.failover.exhausted.total")
        .with_description("Total failover executions that exhausted all candidates")
        .build()
}

/// Total circuit breaker state transitions
///
/// Labels:
/// - scope: provider, node
/// - to_state: open, half_open, closed
pub fn circuit_transitions_total() -> Counter<u64> {
    meter()
        .u64_counter("federation.circuit.transitions.total")
        .with_description("Total circuit breaker state transitions")
        .build()
}

/// Total inbound requests rejected by the rate limiter
///
/// Labels:
/// - endpoint: request path
pub fn rate_limit_rejections_total() -> Counter<u64> {
    meter()
        .u64_counter("federation.rate_limit.rejections.total")
        .with_description("Total inbound node requests rejected by rate limiting")
        .build()
}

/// Total outbound calls to remote nodes
///
/// Labels:
/// - operation: search, action, ping
/// - result: success, failure, skipped
pub fn node_forward_total() -> Counter<u64> {
    meter()
        .u64_counter("federation.node.forward.total")
        .with_description("Total outbound calls forwarded to federation nodes")
        .build()
}
