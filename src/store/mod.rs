//! # Health Store
//!
//! Shared, weakly-consistent key-value store holding circuit state, health
//! records, round-robin cursors, and rate windows. Every component that needs
//! cross-request coordination receives an `Arc<dyn HealthStore>`; nothing in
//! the crate keeps process-wide maps of its own.
//!
//! Writes are last-write-wins. The only atomic primitives required from a
//! backend are [`HealthStore::compare_and_set`] and
//! [`HealthStore::increment_window`].

pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use memory::InMemoryHealthStore;

/// Bounded retries for compare-and-set update loops before falling back to a
/// plain last-write-wins `set`.
const MAX_CAS_RETRIES: usize = 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Value serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt value at {key}: {reason}")]
    CorruptValue { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of bumping a fixed-window counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Count after this increment (1 for the first hit in a window)
    pub count: u64,
    /// Time until the window resets
    pub expires_in: Duration,
}

#[async_trait]
pub trait HealthStore: Send + Sync + std::fmt::Debug {
    /// Read a live (non-expired) value
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Unconditionally write a value, replacing any previous TTL
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> StoreResult<()>;

    /// Remove a key, returning whether a live value was present
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Write `value` only if the current live value equals `expected`
    /// (`None` meaning "absent or expired").
    async fn compare_and_set(
        &self,
        key: &str,
        expected: Option<&Value>,
        value: Value,
        ttl: Option<Duration>,
    ) -> StoreResult<bool>;

    /// Atomically increment a counter that resets when `window` elapses after
    /// its first increment.
    async fn increment_window(&self, key: &str, window: Duration) -> StoreResult<WindowCount>;

    /// List live keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Read and decode a typed value
pub async fn load<T: DeserializeOwned>(
    store: &dyn HealthStore,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::CorruptValue {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Encode and write a typed value
pub async fn save<T: Serialize>(
    store: &dyn HealthStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> StoreResult<()> {
    store.set(key, serde_json::to_value(value)?, ttl).await
}

/// Read-modify-write a typed value through compare-and-set.
///
/// `apply` receives the current decoded value (or `None`) and returns the
/// replacement; `ttl_for` picks the TTL from the replacement. After
/// `MAX_CAS_RETRIES` lost races the last computed value is written with a
/// plain `set`.
pub async fn update<T, F, G>(
    store: &dyn HealthStore,
    key: &str,
    mut apply: F,
    ttl_for: G,
) -> StoreResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> T,
    G: Fn(&T) -> Option<Duration>,
{
    let mut last_candidate = None;

    for attempt in 0..MAX_CAS_RETRIES {
        let raw = store.get(key).await?;
        let current = match &raw {
            Some(value) => Some(serde_json::from_value::<T>(value.clone()).map_err(|e| {
                StoreError::CorruptValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
            })?),
            None => None,
        };

        let next = apply(current);
        let encoded = serde_json::to_value(&next)?;
        let ttl = ttl_for(&next);

        if store
            .compare_and_set(key, raw.as_ref(), encoded.clone(), ttl)
            .await?
        {
            return Ok(next);
        }

        debug!(key = %key, attempt = attempt + 1, "Lost compare-and-set race, retrying");
        last_candidate = Some((next, encoded, ttl));
    }

    match last_candidate {
        Some((next, encoded, ttl)) => {
            store.set(key, encoded, ttl).await?;
            Ok(next)
        }
        None => Err(StoreError::Unavailable(format!(
            "update of {key} made no attempts"
        ))),
    }
}
