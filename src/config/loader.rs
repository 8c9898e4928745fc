//! Configuration Loader
//!
//! Environment-aware layered loading with the `config` crate:
//!
//! 1. built-in defaults
//! 2. `config/federation.toml`
//! 3. `config/federation.{environment}.toml`
//! 4. environment variables `FEDERATION__SECTION__KEY`
//!
//! Both files are optional. The merged result is validated before use.

use config::{Config, Environment, File, FileFormat};
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::FederationConfig;

const BASE_FILE_NAME: &str = "federation";
const ENV_PREFIX: &str = "FEDERATION";
const REDACTED: &str = "***REDACTED***";

#[derive(Debug)]
pub struct ConfigManager {
    config: FederationConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading federation configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        let sanitized = Self::sanitize_config_for_logging(&config);
        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&sanitized)
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            strategy = %config.failover.strategy,
            failure_threshold = config.circuit_breaker.failure_threshold,
            rate_limit = config.rate_limit.max_requests,
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: FederationConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Sanitized configuration for debugging/logging with secrets masked
    pub fn debug_config(&self) -> Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    fn load_and_merge_config(config_directory: &Path, environment: &str) -> ConfigResult<FederationConfig> {
        let defaults = Config::try_from(&FederationConfig::default())?;
        let base_path = config_directory.join(format!("{BASE_FILE_NAME}.toml"));
        let env_path = config_directory.join(format!("{BASE_FILE_NAME}.{environment}.toml"));

        for path in [&base_path, &env_path] {
            if path.exists() {
                debug!(file = %path.display(), "Merging configuration file");
            }
        }

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::from(base_path).format(FileFormat::Toml).required(false))
            .add_source(File::from(env_path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        merged
            .try_deserialize::<FederationConfig>()
            .map_err(|e| ConfigurationError::parse_error(format!("{BASE_FILE_NAME} configuration"), e))
    }

    /// Mask secrets before the configuration is logged or printed
    fn sanitize_config_for_logging(config: &FederationConfig) -> Value {
        let mut value = serde_json::to_value(config).unwrap_or(Value::Null);
        if let Some(auth) = value
            .get_mut("federation")
            .and_then(|federation| federation.get_mut("auth"))
            .and_then(Value::as_object_mut)
        {
            for field in ["signing_secret", "registration_key"] {
                if let Some(secret) = auth.get_mut(field) {
                    let present = secret.as_str().is_some_and(|s| !s.is_empty());
                    if present {
                        *secret = Value::String(REDACTED.to_string());
                    }
                }
            }
        }
        value
    }

    /// Detect environment: FEDERATION_ENV, then APP_ENV, then "development"
    pub fn detect_environment() -> String {
        env::var("FEDERATION_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    /// `FEDERATION_CONFIG_DIR` or `./config`
    fn default_config_directory() -> PathBuf {
        env::var("FEDERATION_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}
