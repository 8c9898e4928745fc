//! # Node Authentication
//!
//! Resolves an inbound bearer credential to a registered node. Signed tokens
//! (HS256, subject = node id) are tried first; anything that does not verify
//! is looked up as a static per-node key. Either way the node must be active:
//! a valid credential for a disabled node is an authorization failure, not an
//! authentication failure.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::node::{Node, NodeStatus};
use super::registry::{constant_time_eq, NodeRegistry};
use crate::constants::defaults;

#[derive(Error, Debug)]
pub enum NodeAuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Authorization header must use Bearer scheme")]
    InvalidAuthFormat,

    #[error("Invalid or unknown credential")]
    InvalidCredential,

    #[error("Node {slug} is {status}")]
    NodeNotActive { slug: String, status: NodeStatus },

    #[error("Invalid registration key")]
    InvalidRegistrationKey,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("JWT processing error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

impl NodeAuthError {
    /// Forbidden (403) rather than Unauthorized (401)
    pub fn is_authorization_failure(&self) -> bool {
        matches!(self, NodeAuthError::NodeNotActive { .. })
    }
}

/// Runtime settings for node credentials
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAuthConfig {
    /// Issue and accept signed tokens; static keys are always accepted
    pub tokens_enabled: bool,
    pub signing_secret: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl: Duration,
    /// When set, `/register` requires this value in `X-Registration-Key`
    pub registration_key: Option<String>,
}

impl Default for NodeAuthConfig {
    fn default() -> Self {
        Self {
            tokens_enabled: true,
            signing_secret: String::new(),
            issuer: "federation-core".to_string(),
            audience: "federation-nodes".to_string(),
            token_ttl: Duration::from_secs(defaults::NODE_TOKEN_TTL_SECONDS),
            registration_key: None,
        }
    }
}

/// JWT claims carried by node tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NodeClaims {
    /// Node id
    pub sub: String,
    pub slug: String,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
}

/// Token handed to a node on registration or refresh
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct NodeAuthenticator {
    config: NodeAuthConfig,
    registry: Arc<NodeRegistry>,
    encoding_key: Option<EncodingKey>,
    decoding_key: Option<DecodingKey>,
}

impl std::fmt::Debug for NodeAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeAuthenticator")
            .field("tokens_enabled", &self.config.tokens_enabled)
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("registration_key_required", &self.config.registration_key.is_some())
            .finish()
    }
}

impl NodeAuthenticator {
    pub fn new(config: NodeAuthConfig, registry: Arc<NodeRegistry>) -> Result<Self, NodeAuthError> {
        if !config.tokens_enabled {
            debug!("Signed node tokens disabled, static keys only");
            return Ok(Self {
                config,
                registry,
                encoding_key: None,
                decoding_key: None,
            });
        }

        if config.signing_secret.is_empty() {
            return Err(NodeAuthError::ConfigurationError(
                "signing secret not configured".to_string(),
            ));
        }

        let encoding_key = Some(EncodingKey::from_secret(config.signing_secret.as_bytes()));
        let decoding_key = Some(DecodingKey::from_secret(config.signing_secret.as_bytes()));

        Ok(Self {
            config,
            registry,
            encoding_key,
            decoding_key,
        })
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &NodeAuthConfig {
        &self.config
    }

    /// Resolve a bearer credential to an active node
    pub fn authenticate(&self, credential: &str) -> Result<Node, NodeAuthError> {
        if credential.is_empty() {
            return Err(NodeAuthError::MissingCredential);
        }

        let node = match self.validate_token(credential) {
            Some(claims) => {
                let node = Uuid::parse_str(&claims.sub)
                    .ok()
                    .and_then(|id| self.registry.get(&id))
                    .ok_or_else(|| {
                        warn!(subject = %claims.sub, "Token subject is not a registered node");
                        NodeAuthError::InvalidCredential
                    })?;
                debug!(node_id = %node.id, slug = %node.slug, "Node authenticated by signed token");
                node
            }
            None => {
                let node = self
                    .registry
                    .find_by_credential(credential)
                    .ok_or(NodeAuthError::InvalidCredential)?;
                debug!(node_id = %node.id, slug = %node.slug, "Node authenticated by static key");
                node
            }
        };

        if !node.is_active() {
            warn!(node_id = %node.id, slug = %node.slug, status = %node.status, "Credential valid but node not active");
            return Err(NodeAuthError::NodeNotActive {
                slug: node.slug,
                status: node.status,
            });
        }

        Ok(node)
    }

    fn validate_token(&self, token: &str) -> Option<NodeClaims> {
        let decoding_key = self.decoding_key.as_ref()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.validate_exp = true;
        validation.validate_nbf = false;

        match decode::<NodeClaims>(token, decoding_key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(error = %e, "Credential is not a valid signed token, trying static key");
                None
            }
        }
    }

    /// Sign a token for a node
    pub fn issue_token(&self, node: &Node) -> Result<IssuedToken, NodeAuthError> {
        let encoding_key = self.encoding_key.as_ref().ok_or_else(|| {
            NodeAuthError::ConfigurationError("signed node tokens are disabled".to_string())
        })?;

        let now = Utc::now();
        let ttl = ChronoDuration::from_std(self.config.token_ttl)
            .map_err(|e| NodeAuthError::ConfigurationError(format!("token ttl out of range: {e}")))?;
        let expiry = now + ttl;

        let claims = NodeClaims {
            sub: node.id.to_string(),
            slug: node.slug.clone(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: expiry.timestamp(),
            iat: now.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, encoding_key).map_err(|e| {
            error!(error = %e, node_id = %node.id, "Failed to sign node token");
            NodeAuthError::JwtError(e)
        })?;

        debug!(node_id = %node.id, expiry_timestamp = claims.exp, "Issued node token");

        Ok(IssuedToken {
            token,
            expires_at: Utc.timestamp_opt(claims.exp, 0).single().unwrap_or(expiry),
        })
    }

    /// Gate for `/register` when a registration key is configured
    pub fn check_registration_key(&self, provided: Option<&str>) -> Result<(), NodeAuthError> {
        match &self.config.registration_key {
            None => Ok(()),
            Some(expected) => match provided {
                Some(provided) if constant_time_eq(expected, provided) => Ok(()),
                _ => Err(NodeAuthError::InvalidRegistrationKey),
            },
        }
    }

    /// Extract bearer token from an Authorization header value
    pub fn extract_bearer_token(auth_header: &str) -> Result<&str, NodeAuthError> {
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(NodeAuthError::InvalidAuthFormat)?;

        if token.is_empty() {
            return Err(NodeAuthError::MissingCredential);
        }

        Ok(token)
    }
}
