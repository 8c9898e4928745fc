//! Remote node model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::constants::defaults;

/// Operator-visible status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Active,
    /// Disabled by an operator; never flipped automatically
    Inactive,
    /// Failing health pings
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Active => "active",
            NodeStatus::Inactive => "inactive",
            NodeStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An independently operated application instance reachable over HTTP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub slug: String,
    pub url: String,
    /// Static key the node presents to us and we present to it
    #[serde(skip_serializing, default)]
    pub credential: String,
    pub capabilities: BTreeSet<String>,
    pub weight: u32,
    pub status: NodeStatus,
    pub last_ping_at: Option<DateTime<Utc>>,
    pub response_time_ms: Option<f64>,
    pub registered_at: DateTime<Utc>,
}

impl Node {
    pub fn new(slug: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            url: url.into().trim_end_matches('/').to_string(),
            credential: generate_credential(),
            capabilities: BTreeSet::new(),
            weight: defaults::NODE_WEIGHT,
            status: NodeStatus::Active,
            last_ping_at: None,
            response_time_ms: None,
            registered_at: Utc::now(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    /// Key used for this node's circuit and health records
    pub fn identity(&self) -> String {
        self.id.to_string()
    }

    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Declared weight for weighted selection; zero counts as one
    pub fn effective_weight(&self) -> u32 {
        self.weight.max(1)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

/// Body of `POST /register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRegistration {
    pub slug: String,
    pub url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub weight: Option<u32>,
}

impl NodeRegistration {
    pub fn into_node(self) -> Node {
        Node::new(self.slug, self.url)
            .with_capabilities(self.capabilities)
            .with_weight(self.weight.unwrap_or(defaults::NODE_WEIGHT))
    }
}

pub(crate) fn generate_credential() -> String {
    format!("fnk_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_node_defaults() {
        let node = Node::new("alpha", "https://alpha.example.com/");
        assert_eq!(node.url, "https://alpha.example.com");
        assert_eq!(node.endpoint("/search"), "https://alpha.example.com/search");
        assert!(node.is_active());
        assert_eq!(node.weight, 100);
        assert!(node.credential.starts_with("fnk_"));
    }

    #[test]
    fn test_zero_weight_counts_as_one() {
        let node = Node::new("alpha", "http://a").with_weight(0);
        assert_eq!(node.effective_weight(), 1);
    }

    #[test]
    fn test_credential_is_never_serialized() {
        let node = Node::new("alpha", "http://a").with_credential("secret");
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("credential").is_none());
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_registration_builds_node() {
        let registration: NodeRegistration = serde_json::from_value(serde_json::json!({
            "slug": "beta",
            "url": "http://beta:3000",
            "capabilities": ["search", "actions"]
        }))
        .unwrap();

        let node = registration.into_node();
        assert!(node.has_capability("search"));
        assert_eq!(node.weight, 100);
    }
}
