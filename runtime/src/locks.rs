//! Per-entity mutexes with bounded waits.
//!
//! Seats, wallets and bookings are shared mutable state. Each entity sits behind
//! its own `tokio::sync::Mutex`, and every acquisition is wrapped in a timeout so
//! a stuck holder surfaces as a retryable [`LockError::Timeout`] instead of
//! starving other buyers.
//!
//! Guards are owned (`OwnedMutexGuard`) so a caller can hold several of them at
//! once, e.g. every seat of a booking in sorted order.

use crate::metrics::LockMetrics;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Errors from entity lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// No entity with that key is registered.
    #[error("{table} {key} not found")]
    NotFound {
        /// Table name
        table: &'static str,
        /// Display rendering of the key
        key: String,
    },

    /// The entity already exists.
    #[error("{table} {key} already exists")]
    Duplicate {
        /// Table name
        table: &'static str,
        /// Display rendering of the key
        key: String,
    },

    /// The lock was not granted within the wait budget.
    #[error("timed out after {waited:?} waiting for {table} {key}")]
    Timeout {
        /// Table name
        table: &'static str,
        /// Display rendering of the key
        key: String,
        /// How long the caller waited
        waited: Duration,
    },
}

/// Acquire `mutex`, giving up after `wait`.
///
/// # Errors
///
/// Returns [`LockError::Timeout`] when the lock is still held after `wait`.
pub async fn lock_within<T>(
    mutex: &Arc<Mutex<T>>,
    wait: Duration,
    table: &'static str,
    key: &impl fmt::Display,
) -> Result<OwnedMutexGuard<T>, LockError> {
    let started = Instant::now();
    match tokio::time::timeout(wait, Arc::clone(mutex).lock_owned()).await {
        Ok(guard) => {
            LockMetrics::record_acquired(table, started.elapsed());
            Ok(guard)
        }
        Err(_) => {
            LockMetrics::record_timeout(table);
            tracing::warn!(
                table,
                key = %key,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Entity lock wait timed out"
            );
            Err(LockError::Timeout {
                table,
                key: key.to_string(),
                waited: wait,
            })
        }
    }
}

/// Arena of entities keyed by id, each behind its own bounded mutex.
///
/// Map shards are only touched long enough to clone the entity's `Arc`; no
/// shard reference is ever held across an `.await`.
pub struct EntityTable<K, V> {
    name: &'static str,
    wait: Duration,
    entries: DashMap<K, Arc<Mutex<V>>>,
}

impl<K: Eq + Hash, V> fmt::Debug for EntityTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityTable")
            .field("name", &self.name)
            .field("wait", &self.wait)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<K, V> EntityTable<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
{
    /// Create an empty table whose locks wait at most `wait`.
    #[must_use]
    pub fn new(name: &'static str, wait: Duration) -> Self {
        Self {
            name,
            wait,
            entries: DashMap::new(),
        }
    }

    /// Table name used in errors, logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Insert a new entity.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Duplicate`] if the key is taken.
    pub fn insert(&self, key: K, value: V) -> Result<(), LockError> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(key) {
            Entry::Occupied(occupied) => Err(LockError::Duplicate {
                table: self.name,
                key: occupied.key().to_string(),
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(Mutex::new(value)));
                Ok(())
            }
        }
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every key.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    /// Lock the entity, waiting at most the table's wait budget.
    ///
    /// # Errors
    ///
    /// [`LockError::NotFound`] for unknown keys, [`LockError::Timeout`] when
    /// the budget runs out.
    pub async fn lock(&self, key: &K) -> Result<OwnedMutexGuard<V>, LockError> {
        let mutex = self.handle(key)?;
        lock_within(&mutex, self.wait, self.name, key).await
    }

    /// Lock the entity only if nobody holds it right now.
    ///
    /// Returns `None` when the key is unknown or the entity is busy. Used by
    /// background sweeps that should skip, not wait on, in-flight work.
    #[must_use]
    pub fn try_lock(&self, key: &K) -> Option<OwnedMutexGuard<V>> {
        let mutex = self.handle(key).ok()?;
        mutex.try_lock_owned().ok()
    }

    fn handle(&self, key: &K) -> Result<Arc<Mutex<V>>, LockError> {
        self.entries
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| LockError::NotFound {
                table: self.name,
                key: key.to_string(),
            })
    }
}

impl<K, V> EntityTable<K, V>
where
    K: Eq + Hash + Clone + fmt::Display,
    V: Clone,
{
    /// Clone of the entity's current value.
    ///
    /// # Errors
    ///
    /// Same as [`EntityTable::lock`].
    pub async fn snapshot(&self, key: &K) -> Result<V, LockError> {
        let guard = self.lock(key).await?;
        Ok(guard.clone())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn table() -> EntityTable<u32, String> {
        EntityTable::new("widget", Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let table = table();
        table.insert(1, "a".to_string()).unwrap();
        let err = table.insert(1, "b".to_string()).unwrap_err();
        assert_eq!(
            err,
            LockError::Duplicate {
                table: "widget",
                key: "1".to_string()
            }
        );
        assert_eq!(table.snapshot(&1).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_lock_times_out_while_held() {
        let table = table();
        table.insert(7, "busy".to_string()).unwrap();

        let _held = table.lock(&7).await.unwrap();
        let err = table.lock(&7).await.unwrap_err();
        assert!(matches!(err, LockError::Timeout { table: "widget", .. }));
        assert!(table.try_lock(&7).is_none());
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let table = table();
        table.insert(3, "x".to_string()).unwrap();
        {
            let mut guard = table.lock(&3).await.unwrap();
            guard.push('y');
        }
        assert_eq!(table.snapshot(&3).await.unwrap(), "xy");
    }

    #[test]
    fn test_debug_reports_name_and_size() {
        let table = table();
        table.insert(1, "a".to_string()).unwrap();
        table.insert(2, "b".to_string()).unwrap();
        let rendered = format!("{table:?}");
        assert!(rendered.contains("widget"), "{rendered}");
        assert!(rendered.contains("len: 2"), "{rendered}");
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let table = table();
        assert!(matches!(
            table.lock(&99).await,
            Err(LockError::NotFound { .. })
        ));
        assert!(table.try_lock(&99).is_none());
    }
}
