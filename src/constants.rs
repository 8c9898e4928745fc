//! # System Constants
//!
//! Defaults, store key prefixes, and event names that define the operational
//! boundaries of provider failover and node federation.

/// Events published on the federation event stream
pub mod events {
    pub const SYSTEM_FAILURE: &str = "federation.system_failure";
    pub const CIRCUIT_OPENED: &str = "federation.circuit_opened";
    pub const CIRCUIT_CLOSED: &str = "federation.circuit_closed";
    pub const NODE_STATUS_CHANGED: &str = "federation.node_status_changed";
    pub const TRANSACTION_ROLLED_BACK: &str = "federation.transaction_rolled_back";
}

/// Key prefixes used in the shared health store
pub mod keys {
    pub const CIRCUIT: &str = "circuit";
    pub const HEALTH: &str = "health";
    pub const ROUND_ROBIN_CURSOR: &str = "rr_cursor";
    pub const RATE_WINDOW: &str = "rate";

    /// Build a store key from a prefix, a scope, and an identity
    pub fn scoped(prefix: &str, scope: &str, identity: &str) -> String {
        format!("{prefix}:{scope}:{identity}")
    }
}

/// Circuit and health scopes. Provider failover and node federation share
/// one breaker implementation; the scope keeps their identities apart.
pub mod scopes {
    pub const PROVIDER: &str = "provider";
    pub const NODE: &str = "node";
}

/// Default values for configuration
pub mod defaults {
    pub const FAILURE_THRESHOLD: u32 = 5;
    pub const CIRCUIT_STATE_TTL_SECONDS: u64 = 60;
    pub const RETRY_TIMEOUT_SECONDS: u64 = 300;

    pub const HEALTH_RECORD_TTL_SECONDS: u64 = 3600;
    pub const RESPONSE_TIME_CEILING_MS: u64 = 5000;
    pub const RECENT_FAILURE_PENALTY: f64 = 0.2;
    pub const PENALTY_WINDOW_SECONDS: u64 = 3600;
    pub const ROUND_ROBIN_MIN_HEALTH: f64 = 0.3;

    pub const PROVIDER_PRIORITY: u8 = 50;
    pub const ATTEMPT_TIMEOUT_MS: u64 = 30_000;

    pub const NODE_REQUEST_TIMEOUT_MS: u64 = 10_000;
    pub const NODE_TOKEN_TTL_SECONDS: u64 = 86_400;
    pub const NODE_WEIGHT: u32 = 100;

    pub const RATE_LIMIT_REQUESTS: u32 = 60;
    pub const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}

/// Health score blend weights
pub mod scoring {
    pub const SUCCESS_RATE_WEIGHT: f64 = 0.6;
    pub const RESPONSE_TIME_WEIGHT: f64 = 0.4;

    pub const PRIORITY_HEALTH_WEIGHT: f64 = 0.7;
    pub const PRIORITY_WEIGHT: f64 = 0.3;
}

/// HTTP header names used by the node API
pub mod headers {
    pub const REGISTRATION_KEY: &str = "x-registration-key";
    pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
    pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
    pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_key_format() {
        assert_eq!(
            keys::scoped(keys::CIRCUIT, scopes::PROVIDER, "openai"),
            "circuit:provider:openai"
        );
    }

    #[test]
    fn test_scoring_weights_sum_to_one() {
        assert!((scoring::SUCCESS_RATE_WEIGHT + scoring::RESPONSE_TIME_WEIGHT - 1.0).abs() < 1e-9);
        assert!((scoring::PRIORITY_HEALTH_WEIGHT + scoring::PRIORITY_WEIGHT - 1.0).abs() < 1e-9);
    }
}
