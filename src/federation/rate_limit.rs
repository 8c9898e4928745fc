//! # Inbound Rate Limiting
//!
//! Fixed-window counters keyed by `(node, endpoint)` in the shared store. The
//! window starts at the first request and resets atomically when it expires.
//! A store failure lets the request through.

use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{defaults, keys};
use crate::metrics;
use crate::store::HealthStore;

/// Runtime limits applied to every node/endpoint pair
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: defaults::RATE_LIMIT_REQUESTS,
            window: Duration::from_secs(defaults::RATE_LIMIT_WINDOW_SECONDS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Limited {
        limit: u32,
        /// Remaining window time, never below one second
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Allowed { .. } => None,
            Self::Limited { retry_after, .. } => Some(*retry_after),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixedWindowRateLimiter {
    store: Arc<dyn HealthStore>,
    config: RateLimitConfig,
}

impl FixedWindowRateLimiter {
    pub fn new(store: Arc<dyn HealthStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one request and decide whether it may proceed
    pub async fn check(&self, node_identity: &str, endpoint: &str) -> RateLimitDecision {
        let limit = self.config.max_requests;
        if !self.config.enabled {
            return RateLimitDecision::Allowed {
                limit,
                remaining: limit,
                reset_after: self.config.window,
            };
        }

        let key = keys::scoped(keys::RATE_WINDOW, node_identity, endpoint);
        let window = match self.store.increment_window(&key, self.config.window).await {
            Ok(window) => window,
            Err(e) => {
                warn!(node = %node_identity, endpoint = %endpoint, error = %e, "Rate window unavailable, allowing request");
                return RateLimitDecision::Allowed {
                    limit,
                    remaining: limit,
                    reset_after: self.config.window,
                };
            }
        };

        if window.count > u64::from(limit) {
            let retry_after = round_up_to_second(window.expires_in);
            debug!(
                node = %node_identity,
                endpoint = %endpoint,
                count = window.count,
                limit,
                retry_after_seconds = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            metrics::rate_limit_rejections_total()
                .add(1, &[KeyValue::new("endpoint", endpoint.to_string())]);
            return RateLimitDecision::Limited { limit, retry_after };
        }

        RateLimitDecision::Allowed {
            limit,
            remaining: limit.saturating_sub(window.count as u32),
            reset_after: window.expires_in,
        }
    }
}

fn round_up_to_second(duration: Duration) -> Duration {
    let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    Duration::from_secs(seconds.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryHealthStore;

    fn limiter(max_requests: u32, window: Duration) -> FixedWindowRateLimiter {
        FixedWindowRateLimiter::new(
            Arc::new(InMemoryHealthStore::new()),
            RateLimitConfig {
                enabled: true,
                max_requests,
                window,
            },
        )
    }

    #[tokio::test]
    async fn test_threshold_request_passes_next_is_limited() {
        let limiter = limiter(3, Duration::from_secs(60));

        for expected_remaining in [2, 1, 0] {
            match limiter.check("node-a", "/search").await {
                RateLimitDecision::Allowed { remaining, limit, .. } => {
                    assert_eq!(limit, 3);
                    assert_eq!(remaining, expected_remaining);
                }
                other => panic!("expected allowed, got {other:?}"),
            }
        }

        let limited = limiter.check("node-a", "/search").await;
        assert!(!limited.is_allowed());
        assert!(limited.retry_after().unwrap() > Duration::ZERO);
        assert!(limited.retry_after().unwrap() <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_windows_are_per_node_and_endpoint() {
        let limiter = limiter(1, Duration::from_secs(60));

        assert!(limiter.check("node-a", "/search").await.is_allowed());
        assert!(!limiter.check("node-a", "/search").await.is_allowed());
        assert!(limiter.check("node-a", "/actions").await.is_allowed());
        assert!(limiter.check("node-b", "/search").await.is_allowed());
    }

    #[tokio::test]
    async fn test_window_resets_after_expiry() {
        let limiter = limiter(1, Duration::from_millis(50));

        assert!(limiter.check("node-a", "/search").await.is_allowed());
        let limited = limiter.check("node-a", "/search").await;
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(1)));

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(limiter.check("node-a", "/search").await.is_allowed());
    }

    #[tokio::test]
    async fn test_disabled_limiter_allows_everything() {
        let limiter = FixedWindowRateLimiter::new(
            Arc::new(InMemoryHealthStore::new()),
            RateLimitConfig {
                enabled: false,
                max_requests: 1,
                window: Duration::from_secs(60),
            },
        );
        for _ in 0..5 {
            assert!(limiter.check("node-a", "/search").await.is_allowed());
        }
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(round_up_to_second(Duration::from_millis(1)), Duration::from_secs(1));
        assert_eq!(round_up_to_second(Duration::from_millis(1500)), Duration::from_secs(2));
        assert_eq!(round_up_to_second(Duration::ZERO), Duration::from_secs(1));
    }
}
