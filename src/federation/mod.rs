//! # Node Federation
//!
//! Extends provider-style routing across independently operated application
//! instances. Outbound calls go through the [`NodeForwarder`], gated by the
//! node-scope circuit breaker; the [`RemoteActionCoordinator`] and
//! [`LoadBalancer`] sit on top. Inbound node traffic is authenticated by the
//! [`NodeAuthenticator`] and throttled by the [`FixedWindowRateLimiter`].

pub mod auth;
pub mod coordinator;
pub mod forwarder;
pub mod load_balancer;
pub mod node;
pub mod rate_limit;
pub mod registry;
pub mod transport;

pub use auth::{IssuedToken, NodeAuthConfig, NodeAuthError, NodeAuthenticator, NodeClaims};
pub use coordinator::{
    BroadcastResult, CoordinatorError, RemoteActionCoordinator, StepOutcome, StepState,
    TransactionPlan, TransactionResult, TransactionStep,
};
pub use forwarder::{ForwardResult, NodeForwarder, PingResult};
pub use load_balancer::{LoadBalancer, SelectionStrategy};
pub use node::{Node, NodeRegistration, NodeStatus};
pub use rate_limit::{FixedWindowRateLimiter, RateLimitConfig, RateLimitDecision};
pub use registry::{InFlightGuard, NodeRegistry, RegistryError};
pub use transport::{HttpNodeTransport, NodeRequest, NodeTransport, TransportError};
