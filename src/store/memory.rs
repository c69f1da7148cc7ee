//! In-memory counter store.
//!
//! Backs tests and single-process deployments. Per-key atomicity comes from
//! the map's sharded locking: an entry guard holds its shard for the
//! duration of the read-modify-write.

use async_trait::async_trait;
use dashmap::DashMap;

use super::CounterStore;
use crate::error::Result;

/// A process-local [`CounterStore`] backed by a concurrent hash map.
///
/// State is not shared across processes; fleet-wide enforcement needs a
/// networked store behind the same trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, i64>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn key_count(&self) -> usize {
        self.values.len()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.values.get(key).map(|v| *v))
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64> {
        let mut entry = self.values.entry(key.to_string()).or_insert(0);
        *entry += amount;
        Ok(*entry)
    }

    async fn decr_by(&self, key: &str, amount: i64) -> Result<i64> {
        self.incr_by(key, -amount).await
    }

    async fn compare_and_swap(&self, key: &str, expected: i64, new: i64) -> Result<bool> {
        let mut entry = self.values.entry(key.to_string()).or_insert(0);
        if *entry == expected {
            *entry = new;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
