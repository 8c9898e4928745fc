//! # Resilience Configuration
//!
//! Runtime (Duration-typed) settings for circuit breakers and health scoring.
//! The file-facing equivalents live in `crate::config` and convert into these
//! via `to_resilience_config()`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;

/// Configuration shared by every circuit in a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,

    /// How long a closed circuit record lives without writes
    pub state_ttl: Duration,

    /// Time to wait in open state before allowing a half-open probe
    pub retry_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold == 0 {
            return Err("failure_threshold must be greater than 0".to_string());
        }

        if self.failure_threshold > 100 {
            return Err("failure_threshold should not exceed 100".to_string());
        }

        if self.state_ttl.is_zero() {
            return Err("state_ttl must be greater than 0".to_string());
        }

        if self.retry_timeout.is_zero() {
            return Err("retry_timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// TTL applied to records that are open or probing. Covers the cooldown
    /// (or a probe lease) plus a grace period, so the record is still present
    /// when the half-open probe is granted, re-granted, or its outcome lands.
    pub fn tripped_record_ttl(&self) -> Duration {
        self.retry_timeout + self.state_ttl.max(self.retry_timeout)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::FAILURE_THRESHOLD,
            state_ttl: Duration::from_secs(defaults::CIRCUIT_STATE_TTL_SECONDS),
            retry_timeout: Duration::from_secs(defaults::RETRY_TIMEOUT_SECONDS),
        }
    }
}

/// Tunables for the health score. None of these are an external contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScoringConfig {
    /// Health records self-expire after this long without updates
    pub record_ttl: Duration,

    /// Average latency at which the response-time component reaches zero
    pub response_time_ceiling: Duration,

    /// Penalty subtracted right after a failure; decays linearly to zero
    pub recent_failure_penalty: f64,

    /// Window over which the failure penalty decays
    pub penalty_window: Duration,

    /// Minimum score for a candidate to join the round-robin rotation
    pub round_robin_min_health: f64,
}

impl HealthScoringConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.record_ttl.is_zero() {
            return Err("record_ttl must be greater than 0".to_string());
        }

        if self.response_time_ceiling.is_zero() {
            return Err("response_time_ceiling must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.recent_failure_penalty) {
            return Err("recent_failure_penalty must be within [0, 1]".to_string());
        }

        if self.penalty_window.is_zero() {
            return Err("penalty_window must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.round_robin_min_health) {
            return Err("round_robin_min_health must be within [0, 1]".to_string());
        }

        Ok(())
    }
}

impl Default for HealthScoringConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::from_secs(defaults::HEALTH_RECORD_TTL_SECONDS),
            response_time_ceiling: Duration::from_millis(defaults::RESPONSE_TIME_CEILING_MS),
            recent_failure_penalty: defaults::RECENT_FAILURE_PENALTY,
            penalty_window: Duration::from_secs(defaults::PENALTY_WINDOW_SECONDS),
            round_robin_min_health: defaults::ROUND_ROBIN_MIN_HEALTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_config_validation() {
        let valid_config = CircuitBreakerConfig::default();
        assert!(valid_config.validate().is_ok());

        let mut invalid_config = CircuitBreakerConfig {
            failure_threshold: 0,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            retry_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());

        invalid_config = CircuitBreakerConfig {
            state_ttl: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid_config.validate().is_err());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.state_ttl, Duration::from_secs(60));
        assert_eq!(config.retry_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_tripped_records_outlive_cooldown_and_probe_lease() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.tripped_record_ttl(), Duration::from_secs(600));
        assert!(config.tripped_record_ttl() > config.retry_timeout);

        let short_cooldown = CircuitBreakerConfig {
            retry_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(short_cooldown.tripped_record_ttl(), Duration::from_secs(70));
    }

    #[test]
    fn test_health_scoring_validation() {
        assert!(HealthScoringConfig::default().validate().is_ok());

        let invalid = HealthScoringConfig {
            recent_failure_penalty: 1.5,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = HealthScoringConfig {
            round_robin_min_health: -0.1,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
