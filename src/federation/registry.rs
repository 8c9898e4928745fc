//! # Node Registry
//!
//! Directory of known remote nodes plus the per-node in-flight counters used
//! by least-connections selection. Shared behind an `Arc`; reads never block
//! each other.

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::node::{generate_credential, Node, NodeStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Node not found: {0}")]
    NotFound(String),
    #[error("Node slug already registered: {0}")]
    DuplicateSlug(String),
    #[error("Invalid node: {0}")]
    InvalidNode(String),
}

#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<Uuid, Node>>,
    in_flight: DashMap<Uuid, Arc<AtomicUsize>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Slugs are unique; URLs must be http(s).
    pub fn register(&self, node: Node) -> Result<Node, RegistryError> {
        if node.slug.trim().is_empty() {
            return Err(RegistryError::InvalidNode("slug must not be empty".to_string()));
        }
        if !(node.url.starts_with("http://") || node.url.starts_with("https://")) {
            return Err(RegistryError::InvalidNode(format!(
                "url must be http(s): {}",
                node.url
            )));
        }
        if node.credential.is_empty() {
            return Err(RegistryError::InvalidNode("credential must not be empty".to_string()));
        }

        let mut nodes = self.nodes.write();
        if nodes.values().any(|existing| existing.slug == node.slug) {
            return Err(RegistryError::DuplicateSlug(node.slug));
        }

        info!(node_id = %node.id, slug = %node.slug, url = %node.url, "Node registered");
        nodes.insert(node.id, node.clone());
        Ok(node)
    }

    pub fn remove(&self, id: &Uuid) -> Option<Node> {
        self.in_flight.remove(id);
        let removed = self.nodes.write().remove(id);
        if let Some(node) = &removed {
            info!(node_id = %node.id, slug = %node.slug, "Node removed");
        }
        removed
    }

    pub fn get(&self, id: &Uuid) -> Option<Node> {
        self.nodes.read().get(id).cloned()
    }

    /// Look up by UUID string or slug
    pub fn find(&self, id_or_slug: &str) -> Option<Node> {
        if let Ok(id) = Uuid::parse_str(id_or_slug) {
            if let Some(node) = self.get(&id) {
                return Some(node);
            }
        }
        self.nodes
            .read()
            .values()
            .find(|node| node.slug == id_or_slug)
            .cloned()
    }

    /// Resolve a static credential to its node
    pub fn find_by_credential(&self, credential: &str) -> Option<Node> {
        if credential.is_empty() {
            return None;
        }
        // Check every node so timing does not reveal which one matched
        let nodes = self.nodes.read();
        let mut found = None;
        for node in nodes.values() {
            if constant_time_eq(&node.credential, credential) {
                found = Some(node.clone());
            }
        }
        found
    }

    /// All nodes ordered by slug
    pub fn list(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.slug.cmp(&b.slug));
        nodes
    }

    pub fn active(&self) -> Vec<Node> {
        self.list().into_iter().filter(Node::is_active).collect()
    }

    pub fn with_capability(&self, capability: &str) -> Vec<Node> {
        self.list()
            .into_iter()
            .filter(|node| node.has_capability(capability))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change a node's status, returning the previous one
    pub fn set_status(&self, id: &Uuid, status: NodeStatus) -> Result<NodeStatus, RegistryError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let previous = node.status;
        node.status = status;
        if previous != status {
            debug!(node_id = %id, slug = %node.slug, from = %previous, to = %status, "Node status updated");
        }
        Ok(previous)
    }

    /// Store the outcome of a health ping
    pub fn record_ping(&self, id: &Uuid, response_time_ms: Option<f64>) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        node.last_ping_at = Some(Utc::now());
        if response_time_ms.is_some() {
            node.response_time_ms = response_time_ms;
        }
        Ok(())
    }

    /// Replace a node's static credential, returning the new one
    pub fn rotate_credential(&self, id: &Uuid) -> Result<String, RegistryError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        node.credential = generate_credential();
        info!(node_id = %id, slug = %node.slug, "Node credential rotated");
        Ok(node.credential.clone())
    }

    fn counter(&self, id: &Uuid) -> Arc<AtomicUsize> {
        Arc::clone(self.in_flight.entry(*id).or_default().value())
    }

    /// Calls currently outstanding to a node
    pub fn in_flight(&self, id: &Uuid) -> usize {
        self.in_flight
            .get(id)
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Count an outbound call until the returned guard drops
    pub fn track_in_flight(&self, id: &Uuid) -> InFlightGuard {
        let counter = self.counter(id);
        counter.fetch_add(1, Ordering::AcqRel);
        InFlightGuard { counter }
    }
}

/// Decrements the node's in-flight counter on drop
#[derive(Debug)]
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Compare without short-circuiting on the first differing byte
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}
