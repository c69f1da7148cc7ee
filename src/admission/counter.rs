//! Shared atomic counter protocol.
//!
//! Both admission primitives manage a per-identity counter in the shared
//! store and need two guarantees under concurrent callers: admission must
//! never let the counter settle above capacity, and draining must never
//! take it below zero. This module implements both on top of the store's
//! native atomic primitives, with no external locking.

use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::store::CounterStore;

/// A single named counter in the shared store, with race-free admission and
/// floor-clamped drain operations.
pub struct AdmissionCounter {
    store: Arc<dyn CounterStore>,
    key: String,
}

impl AdmissionCounter {
    /// Create a counter living under `key` in the given store.
    pub fn new(store: Arc<dyn CounterStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The store key this counter lives under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Atomically charge `units` against `capacity`, returning whether the
    /// charge was admitted.
    ///
    /// The protocol is increment-first, roll back on overflow: a single
    /// atomic increment-and-fetch decides admission, and a losing caller
    /// undoes its own speculative charge with an equally atomic decrement.
    /// Any check-then-increment ordering would need a multi-step transaction
    /// to be race-free. Between the increment and a losing caller's rollback
    /// the raw counter may transiently read above `capacity`; observers must
    /// treat that as a normal state, not an error.
    pub async fn admit(&self, units: u32, capacity: u64) -> Result<bool> {
        let total = self.store.incr_by(&self.key, i64::from(units)).await?;
        if total <= capacity as i64 {
            return Ok(true);
        }

        let rolled_back = self.store.decr_by(&self.key, i64::from(units)).await?;
        trace!(
            key = %self.key,
            total,
            rolled_back,
            "Admission overflow rolled back"
        );
        Ok(false)
    }

    /// Atomically subtract `units`, clamping the result at zero, and return
    /// the new value.
    ///
    /// Implemented as a compare-and-swap loop rather than a bare decrement
    /// so a drain larger than the current count never leaves a negative
    /// value behind for other callers to observe. The loop also repairs a
    /// transiently negative count left by a concurrent admission rollback.
    pub async fn drain(&self, units: u64) -> Result<i64> {
        loop {
            let current = self.store.get(&self.key).await?.unwrap_or(0);
            let next = current.saturating_sub(units as i64).max(0);

            if current == next {
                return Ok(next);
            }
            if self.store.compare_and_swap(&self.key, current, next).await? {
                return Ok(next);
            }
        }
    }

    /// Current value, floored at zero for observers.
    pub async fn value(&self) -> Result<u64> {
        let value = self.store.get(&self.key).await?.unwrap_or(0);
        Ok(value.max(0) as u64)
    }

    /// Reset the counter to zero.
    pub async fn reset(&self) -> Result<()> {
        self.store.set(&self.key, 0).await
    }
}
