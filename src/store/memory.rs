//! In-process `HealthStore` backed by `DashMap`.
//!
//! Expiry is lazy: stale entries are treated as absent on read and replaced on
//! write. `purge_expired` can be called to reclaim memory eagerly.
//!
//! ## Usage
//!
//! ```rust
//! use federation_core::store::{HealthStore, InMemoryHealthStore};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryHealthStore::new();
//! let window = Duration::from_secs(60);
//!
//! let first = store.increment_window("rate:node-a:/search", window).await.unwrap();
//! let second = store.increment_window("rate:node-a:/search", window).await.unwrap();
//! assert_eq!((first.count, second.count), (1, 2));
//! # });
//! ```

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};

use super::{HealthStore, StoreError, StoreResult, WindowCount};

#[derive(Debug, Clone)]
struct StoredValue {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Default in-memory store; also the test fake for every component
#[derive(Debug, Default)]
pub struct InMemoryHealthStore {
    entries: DashMap<String, StoredValue>,
}

impl InMemoryHealthStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        before - self.entries.len()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HealthStore for InMemoryHealthStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|stored| stored.is_live(now))
            .map(|stored| stored.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, stored)| stored.is_live(now)))
    }

    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Value>,
        value: Value,
        ttl: Option<Duration>,
    ) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let matches = {
                    let stored = occupied.get();
                    let current = stored.is_live(now).then_some(&stored.value);
                    current == expected
                };
                if matches {
                    occupied.insert(StoredValue::new(value, ttl));
                }
                Ok(matches)
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(StoredValue::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn increment_window(&self, key: &str, window: Duration) -> StoreResult<WindowCount> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredValue::new(Value::from(0u64), Some(window)));

        if !entry.is_live(now) {
            *entry = StoredValue::new(Value::from(0u64), Some(window));
        }

        let current = entry.value.as_u64().ok_or_else(|| StoreError::CorruptValue {
            key: key.to_string(),
            reason: "window counter is not an unsigned integer".to_string(),
        })?;
        let count = current + 1;
        entry.value = Value::from(count);

        let expires_in = entry
            .expires_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(window);

        Ok(WindowCount { count, expires_in })
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live(now))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}
