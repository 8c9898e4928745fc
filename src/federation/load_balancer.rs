//! # Load Balancer
//!
//! Picks a bounded subset of healthy nodes for fan-out. Every strategy first
//! keeps only active nodes whose circuit admits traffic; the check is
//! read-only so selection never consumes a half-open probe.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::node::Node;
use super::registry::NodeRegistry;
use crate::resilience::CircuitBreaker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Lowest observed latency first; unmeasured nodes last
    ResponseTime,
    /// Fewest in-flight calls first
    LeastConnections,
    /// Weighted random sampling without replacement
    Weighted,
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "response_time" => Ok(SelectionStrategy::ResponseTime),
            "least_connections" => Ok(SelectionStrategy::LeastConnections),
            "weighted" => Ok(SelectionStrategy::Weighted),
            other => Err(format!("unknown selection strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    registry: Arc<NodeRegistry>,
    breaker: CircuitBreaker,
}

impl LoadBalancer {
    pub fn new(registry: Arc<NodeRegistry>, breaker: CircuitBreaker) -> Self {
        Self { registry, breaker }
    }

    /// Up to `count` eligible nodes from `pool`; fewer if fewer qualify
    pub async fn select_nodes(&self, pool: &[Node], count: usize, strategy: SelectionStrategy) -> Vec<Node> {
        if count == 0 {
            return Vec::new();
        }

        let mut eligible = Vec::with_capacity(pool.len());
        for node in pool {
            if node.is_active() && self.breaker.allows_traffic(&node.identity()).await {
                eligible.push(node.clone());
            }
        }

        let selected = match strategy {
            SelectionStrategy::ResponseTime => {
                eligible.sort_by(|a, b| compare_latency(a.response_time_ms, b.response_time_ms));
                eligible.truncate(count);
                eligible
            }
            SelectionStrategy::LeastConnections => {
                eligible.sort_by_key(|node| self.registry.in_flight(&node.id));
                eligible.truncate(count);
                eligible
            }
            SelectionStrategy::Weighted => weighted_sample(eligible, count),
        };

        debug!(
            strategy = ?strategy,
            pool = pool.len(),
            requested = count,
            selected = selected.len(),
            "Nodes selected"
        );
        selected
    }

    /// Select from every registered node
    pub async fn select_from_registry(&self, count: usize, strategy: SelectionStrategy) -> Vec<Node> {
        let pool = self.registry.list();
        self.select_nodes(&pool, count, strategy).await
    }
}

fn compare_latency(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn weighted_sample(mut remaining: Vec<Node>, count: usize) -> Vec<Node> {
    let mut selected = Vec::with_capacity(count.min(remaining.len()));
    while selected.len() < count && !remaining.is_empty() {
        let total: u64 = remaining.iter().map(|n| u64::from(n.effective_weight())).sum();
        let mut ticket = fastrand::u64(0..total);
        let mut index = remaining.len() - 1;
        for (i, node) in remaining.iter().enumerate() {
            let weight = u64::from(node.effective_weight());
            if ticket < weight {
                index = i;
                break;
            }
            ticket -= weight;
        }
        selected.push(remaining.swap_remove(index));
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::NodeStatus;
    use crate::resilience::CircuitBreakerConfig;
    use crate::store::InMemoryHealthStore;
    use std::collections::HashMap;

    fn balancer(threshold: u32) -> LoadBalancer {
        LoadBalancer::new(
            Arc::new(NodeRegistry::new()),
            CircuitBreaker::new(
                "node",
                Arc::new(InMemoryHealthStore::new()),
                CircuitBreakerConfig {
                    failure_threshold: threshold,
                    ..Default::default()
                },
            ),
        )
    }

    fn node(slug: &str, latency: Option<f64>) -> Node {
        let mut node = Node::new(slug, format!("http://{slug}"));
        node.response_time_ms = latency;
        node
    }

    fn slugs(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.slug.as_str()).collect()
    }

    #[tokio::test]
    async fn test_response_time_picks_fastest_eligible() {
        let balancer = balancer(1);
        let pool = vec![
            node("slow", Some(400.0)),
            node("fastest-but-open", Some(5.0)),
            node("fast", Some(20.0)),
            node("unmeasured", None),
            node("fastest-but-inactive", Some(1.0)).with_status(NodeStatus::Inactive),
            node("medium", Some(80.0)),
        ];
        balancer.breaker.record_failure(&pool[1].identity()).await;

        let selected = balancer.select_nodes(&pool, 2, SelectionStrategy::ResponseTime).await;
        assert_eq!(slugs(&selected), vec!["fast", "medium"]);
    }

    #[tokio::test]
    async fn test_selection_never_exceeds_eligible_pool() {
        let balancer = balancer(5);
        let pool = vec![node("a", Some(1.0)), node("b", None)];

        for strategy in [
            SelectionStrategy::ResponseTime,
            SelectionStrategy::LeastConnections,
            SelectionStrategy::Weighted,
        ] {
            assert_eq!(balancer.select_nodes(&pool, 10, strategy).await.len(), 2);
            assert!(balancer.select_nodes(&pool, 0, strategy).await.is_empty());
            assert!(balancer.select_nodes(&[], 3, strategy).await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_least_connections_prefers_idle_nodes() {
        let balancer = balancer(5);
        let busy = balancer.registry.register(node("busy", None)).unwrap();
        let idle = balancer.registry.register(node("idle", None)).unwrap();
        let _first = balancer.registry.track_in_flight(&busy.id);
        let _second = balancer.registry.track_in_flight(&busy.id);

        let selected = balancer
            .select_nodes(&[busy, idle], 1, SelectionStrategy::LeastConnections)
            .await;
        assert_eq!(slugs(&selected), vec!["idle"]);
    }

    #[tokio::test]
    async fn test_weighted_sampling_follows_weights() {
        let balancer = balancer(5);
        let pool = vec![
            node("heavy", None).with_weight(90),
            node("light", None).with_weight(10),
        ];

        let mut leaders: HashMap<String, usize> = HashMap::new();
        for _ in 0..500 {
            let selected = balancer.select_nodes(&pool, 1, SelectionStrategy::Weighted).await;
            *leaders.entry(selected[0].slug.clone()).or_default() += 1;
        }
        assert!(leaders["heavy"] > leaders.get("light").copied().unwrap_or(0) * 3);

        let both = balancer.select_nodes(&pool, 2, SelectionStrategy::Weighted).await;
        let mut names = slugs(&both);
        names.sort();
        assert_eq!(names, vec!["heavy", "light"]);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("weighted".parse::<SelectionStrategy>(), Ok(SelectionStrategy::Weighted));
        assert!("fastest".parse::<SelectionStrategy>().is_err());
    }
}
