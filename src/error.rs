//! Error types for the federation core.
//!
//! Each subsystem owns a focused error enum; `FederationError` is the
//! umbrella used at crate boundaries.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::failover::FailoverError;
use crate::federation::auth::NodeAuthError;
use crate::federation::coordinator::CoordinatorError;
use crate::federation::registry::RegistryError;
use crate::federation::transport::TransportError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum FederationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Health store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Failover(#[from] FailoverError),
    #[error(transparent)]
    Authentication(#[from] NodeAuthError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FederationError {
    fn from(error: serde_json::Error) -> Self {
        FederationError::InvalidInput(format!("JSON serialization error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, FederationError>;
