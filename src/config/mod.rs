//! # Federation Configuration System
//!
//! File-facing configuration for failover and federation. Values are plain
//! numbers (seconds, milliseconds) so they read naturally in TOML and
//! environment variables; `to_*` methods convert sections into the
//! Duration-typed runtime configs each component takes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use federation_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration (environment auto-detected)
//! let manager = ConfigManager::load()?;
//!
//! let threshold = manager.config().circuit_breaker.failure_threshold;
//! let strategy = &manager.config().failover.strategy;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::constants::defaults;
use crate::failover::{strategy, ProviderPriorityTable};
use crate::federation::{NodeAuthConfig, RateLimitConfig};
use crate::resilience::{CircuitBreakerConfig, HealthScoringConfig};

/// Root configuration structure mirroring config/federation.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    pub circuit_breaker: CircuitBreakerSettings,
    pub health: HealthSettings,
    pub failover: FailoverSettings,
    pub federation: NodeFederationSettings,
    pub rate_limit: RateLimitSettings,
    pub events: EventSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub state_ttl_seconds: u64,
    pub retry_timeout_seconds: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::FAILURE_THRESHOLD,
            state_ttl_seconds: defaults::CIRCUIT_STATE_TTL_SECONDS,
            retry_timeout_seconds: defaults::RETRY_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthSettings {
    pub record_ttl_seconds: u64,
    pub response_time_ceiling_ms: u64,
    pub recent_failure_penalty: f64,
    pub penalty_window_seconds: u64,
    pub round_robin_min_health: f64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            record_ttl_seconds: defaults::HEALTH_RECORD_TTL_SECONDS,
            response_time_ceiling_ms: defaults::RESPONSE_TIME_CEILING_MS,
            recent_failure_penalty: defaults::RECENT_FAILURE_PENALTY,
            penalty_window_seconds: defaults::PENALTY_WINDOW_SECONDS,
            round_robin_min_health: defaults::ROUND_ROBIN_MIN_HEALTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverSettings {
    /// `priority` or `round_robin`
    pub strategy: String,
    /// Unset means "every candidate"
    pub max_attempts: Option<usize>,
    pub attempt_timeout_ms: u64,
    pub default_priority: u8,
    pub provider_priorities: HashMap<String, u8>,
    /// Store key for the default round-robin cursor
    pub round_robin_key: String,
}

impl Default for FailoverSettings {
    fn default() -> Self {
        Self {
            strategy: strategy::PRIORITY.to_string(),
            max_attempts: None,
            attempt_timeout_ms: defaults::ATTEMPT_TIMEOUT_MS,
            default_priority: defaults::PROVIDER_PRIORITY,
            provider_priorities: HashMap::new(),
            round_robin_key: "providers".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeFederationSettings {
    pub bind_address: String,
    pub request_timeout_ms: u64,
    pub auth: NodeAuthSettings,
}

impl Default for NodeFederationSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_ms: defaults::NODE_REQUEST_TIMEOUT_MS,
            auth: NodeAuthSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeAuthSettings {
    pub tokens_enabled: bool,
    pub signing_secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl_seconds: u64,
    pub registration_key: Option<String>,
}

impl Default for NodeAuthSettings {
    fn default() -> Self {
        let runtime = NodeAuthConfig::default();
        Self {
            tokens_enabled: runtime.tokens_enabled,
            signing_secret: runtime.signing_secret,
            issuer: runtime.issuer,
            audience: runtime.audience,
            token_ttl_seconds: defaults::NODE_TOKEN_TTL_SECONDS,
            registration_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub max_requests: u32,
    pub window_seconds: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: defaults::RATE_LIMIT_REQUESTS,
            window_seconds: defaults::RATE_LIMIT_WINDOW_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EventSettings {
    pub channel_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl FederationConfig {
    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_breaker.failure_threshold,
            state_ttl: Duration::from_secs(self.circuit_breaker.state_ttl_seconds),
            retry_timeout: Duration::from_secs(self.circuit_breaker.retry_timeout_seconds),
        }
    }

    pub fn health_scoring_config(&self) -> HealthScoringConfig {
        HealthScoringConfig {
            record_ttl: Duration::from_secs(self.health.record_ttl_seconds),
            response_time_ceiling: Duration::from_millis(self.health.response_time_ceiling_ms),
            recent_failure_penalty: self.health.recent_failure_penalty,
            penalty_window: Duration::from_secs(self.health.penalty_window_seconds),
            round_robin_min_health: self.health.round_robin_min_health,
        }
    }

    pub fn node_auth_config(&self) -> NodeAuthConfig {
        let auth = &self.federation.auth;
        NodeAuthConfig {
            tokens_enabled: auth.tokens_enabled,
            signing_secret: auth.signing_secret.clone(),
            issuer: auth.issuer.clone(),
            audience: auth.audience.clone(),
            token_ttl: Duration::from_secs(auth.token_ttl_seconds),
            registration_key: auth.registration_key.clone().filter(|key| !key.is_empty()),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            enabled: self.rate_limit.enabled,
            max_requests: self.rate_limit.max_requests,
            window: Duration::from_secs(self.rate_limit.window_seconds),
        }
    }

    pub fn priority_table(&self) -> ProviderPriorityTable {
        ProviderPriorityTable::new(
            self.failover.provider_priorities.clone(),
            self.failover.default_priority,
        )
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.failover.attempt_timeout_ms)
    }

    pub fn node_request_timeout(&self) -> Duration {
        Duration::from_millis(self.federation.request_timeout_ms)
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.circuit_breaker_config()
            .validate()
            .map_err(|e| ConfigurationError::validation_error("circuit_breaker", e))?;

        self.health_scoring_config()
            .validate()
            .map_err(|e| ConfigurationError::validation_error("health", e))?;

        let failover = &self.failover;
        match failover.strategy.as_str() {
            strategy::PRIORITY | strategy::ROUND_ROBIN => {}
            other => {
                return Err(ConfigurationError::invalid_value(
                    "failover.strategy",
                    other,
                    "expected 'priority' or 'round_robin'",
                ))
            }
        }
        if failover.max_attempts == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "failover.max_attempts",
                "0",
                "must be greater than 0 when set",
            ));
        }
        if failover.attempt_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "failover.attempt_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }
        if failover.default_priority > 100 {
            return Err(ConfigurationError::invalid_value(
                "failover.default_priority",
                failover.default_priority.to_string(),
                "priorities range from 0 to 100",
            ));
        }
        if let Some((provider, priority)) = failover
            .provider_priorities
            .iter()
            .find(|(_, priority)| **priority > 100)
        {
            return Err(ConfigurationError::invalid_value(
                format!("failover.provider_priorities.{provider}"),
                priority.to_string(),
                "priorities range from 0 to 100",
            ));
        }

        if self.federation.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "federation.request_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }
        let auth = &self.federation.auth;
        if auth.tokens_enabled && auth.signing_secret.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "signing_secret",
                "federation.auth (required while tokens_enabled = true)",
            ));
        }
        if auth.tokens_enabled && auth.token_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "federation.auth.token_ttl_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        if self.rate_limit.max_requests == 0 {
            return Err(ConfigurationError::invalid_value(
                "rate_limit.max_requests",
                "0",
                "must be greater than 0",
            ));
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "rate_limit.window_seconds",
                "0",
                "must be greater than 0",
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> FederationConfig {
        let mut config = FederationConfig::default();
        config.federation.auth.signing_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = FederationConfig::default();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.state_ttl_seconds, 60);
        assert_eq!(config.circuit_breaker.retry_timeout_seconds, 300);
        assert_eq!(config.failover.max_attempts, None);
        assert_eq!(config.failover.strategy, "priority");
        assert_eq!(config.rate_limit.max_requests, 60);
        assert_eq!(config.rate_limit.window_seconds, 60);
    }

    #[test]
    fn test_default_requires_signing_secret() {
        assert!(FederationConfig::default().validate().is_err());
        assert!(valid().validate().is_ok());

        let mut static_only = FederationConfig::default();
        static_only.federation.auth.tokens_enabled = false;
        assert!(static_only.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = valid();
        config.failover.strategy = "random".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let mut config = valid();
        config.failover.provider_priorities.insert("openai".to_string(), 150);
        assert!(config.validate().is_err());

        let mut config = valid();
        config.circuit_breaker.failure_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ValidationError { .. })
        ));

        let mut config = valid();
        config.health.round_robin_min_health = 2.0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.rate_limit.window_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.failover.max_attempts = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_runtime_conversions() {
        let mut config = valid();
        config.circuit_breaker.retry_timeout_seconds = 30;
        config.failover.provider_priorities.insert("openai".to_string(), 90);
        config.federation.auth.registration_key = Some(String::new());

        assert_eq!(config.circuit_breaker_config().retry_timeout, Duration::from_secs(30));
        assert_eq!(config.priority_table().priority_of("openai"), 90);
        assert_eq!(config.priority_table().priority_of("other"), 50);
        assert_eq!(config.node_auth_config().registration_key, None);
        assert_eq!(config.rate_limit_config().window, Duration::from_secs(60));
    }
}
