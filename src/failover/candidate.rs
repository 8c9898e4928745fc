//! Candidates for failover and the provider priority table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::defaults;

/// One interchangeable target for a unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    /// Static preference in `0..=100`, higher is preferred
    pub priority: u8,
}

impl Candidate {
    pub fn new(id: impl Into<String>, priority: u8) -> Self {
        Self {
            id: id.into(),
            priority: priority.min(100),
        }
    }
}

/// Configured priority per provider, with a fallback for unlisted ones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPriorityTable {
    priorities: HashMap<String, u8>,
    default_priority: u8,
}

impl ProviderPriorityTable {
    pub fn new(priorities: HashMap<String, u8>, default_priority: u8) -> Self {
        Self {
            priorities,
            default_priority: default_priority.min(100),
        }
    }

    pub fn priority_of(&self, id: &str) -> u8 {
        self.priorities
            .get(id)
            .copied()
            .unwrap_or(self.default_priority)
            .min(100)
    }

    /// Build candidates for the given provider ids, preserving their order
    pub fn candidates<I, S>(&self, ids: I) -> Vec<Candidate>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .map(|id| Candidate::new(id.as_ref(), self.priority_of(id.as_ref())))
            .collect()
    }
}

impl Default for ProviderPriorityTable {
    fn default() -> Self {
        Self::new(HashMap::new(), defaults::PROVIDER_PRIORITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_table_falls_back_to_default() {
        let table = ProviderPriorityTable::new(
            HashMap::from([("openai".to_string(), 90), ("local".to_string(), 200)]),
            40,
        );

        let candidates = table.candidates(["openai", "anthropic", "local"]);
        assert_eq!(candidates[0], Candidate::new("openai", 90));
        assert_eq!(candidates[1], Candidate::new("anthropic", 40));
        assert_eq!(candidates[2].priority, 100);
    }

    #[test]
    fn test_default_table_uses_documented_priority() {
        assert_eq!(ProviderPriorityTable::default().priority_of("any"), 50);
    }
}
