//! # Structured Logging Module
//!
//! Environment-aware structured logging plus helpers that give failover,
//! node, and transaction records a uniform shape.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `RUST_LOG` wins when set; otherwise the level follows the environment.
/// `FEDERATION_LOG_FORMAT=json` switches console output to JSON.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json_output = std::env::var("FEDERATION_LOG_FORMAT")
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let layer = if json_output {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A host application may already own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
            return;
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json_output,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("FEDERATION_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log one failover attempt against a candidate
pub fn log_failover_attempt(
    candidate: &str,
    attempt: usize,
    status: &str,
    elapsed_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        candidate = %candidate,
        attempt = attempt,
        status = %status,
        elapsed_ms = elapsed_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔁 FAILOVER_ATTEMPT"
    );
}

/// Log one outbound call to a federation node
pub fn log_node_operation(
    operation: &str,
    node: &str,
    status: &str,
    elapsed_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        node = %node,
        status = %status,
        elapsed_ms = elapsed_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🌐 NODE_OPERATION"
    );
}

/// Log a transaction step transition
pub fn log_transaction_step(
    step: usize,
    node: &str,
    action: &str,
    state: &str,
    details: Option<&str>,
) {
    tracing::info!(
        step = step,
        node = %node,
        action = %action,
        state = %state,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🧾 TRANSACTION_STEP"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_by_environment() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("test"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_failover_attempt("openai", 1, "success", Some(12), None);
        log_node_operation("search", "alpha", "failure", None, Some("timeout"));
        log_transaction_step(0, "alpha", "reserve", "committed", None);
    }
}
