//! Fixed-slot concurrency gate.
//!
//! Bounds simultaneous in-flight requests per caller identity. Unlike the
//! throttle there is no time dimension: slots are held until explicitly
//! released, never aged out. A caller that acquires and never releases
//! permanently consumes a slot; a lease-with-timeout extension would change
//! that contract and is left to the embedding system.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::counter::AdmissionCounter;
use crate::config::FailurePolicy;
use crate::error::Result;
use crate::identity::Identity;
use crate::store::CounterStore;

/// Default key prefix for gate occupancy counters.
const DEFAULT_PREFIX: &str = "gate";

/// A fixed-slot concurrency gate for a single caller identity.
pub struct Gate {
    counter: AdmissionCounter,
    identity: Identity,
    capacity: u64,
}

impl Gate {
    /// Create a gate under the default key prefix.
    ///
    /// `capacity` is the number of slots the identity may occupy
    /// concurrently.
    pub fn new(store: Arc<dyn CounterStore>, identity: Identity, capacity: u64) -> Self {
        Self::with_prefix(store, identity, capacity, DEFAULT_PREFIX)
    }

    /// Create a gate under a custom key prefix.
    ///
    /// Gates with different capacities must never share an identity and
    /// prefix; the prefix also keeps gate occupancy separate from throttle
    /// state for the same identity.
    pub fn with_prefix(
        store: Arc<dyn CounterStore>,
        identity: Identity,
        capacity: u64,
        prefix: &str,
    ) -> Self {
        let slots_key = format!("{}:slots:{}", prefix, identity);
        Self {
            counter: AdmissionCounter::new(store, slots_key),
            identity,
            capacity,
        }
    }

    /// The identity this gate tracks.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Maximum concurrently held slots.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Attempt to occupy `requests` of this identity's slots.
    ///
    /// Returns `Ok(true)` when the slots were granted. Uses the same atomic
    /// increment-then-rollback protocol as the throttle (see
    /// [`AdmissionCounter::admit`]), so concurrent callers can never settle
    /// occupancy above capacity.
    pub async fn acquire(&self, requests: u32) -> Result<bool> {
        let admitted = self.counter.admit(requests, self.capacity).await?;
        if !admitted {
            debug!(identity = %self.identity, requests, "Gate rejected slot request");
        }
        Ok(admitted)
    }

    /// Like [`acquire`](Self::acquire), but resolve store failures per
    /// `policy` instead of propagating them.
    pub async fn acquire_or(&self, requests: u32, policy: FailurePolicy) -> bool {
        match self.acquire(requests).await {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!(
                    identity = %self.identity,
                    error = %e,
                    policy = ?policy,
                    "Counter store failure during gate acquisition"
                );
                policy.admit_on_failure()
            }
        }
    }

    /// Release previously acquired slots when work completes.
    ///
    /// Occupancy is floor-clamped at zero, so excess releases are tolerated
    /// rather than treated as errors.
    pub async fn release(&self, requests: u32) -> Result<()> {
        let occupancy = self.counter.drain(u64::from(requests)).await?;
        trace!(identity = %self.identity, requests, occupancy, "Released slots");
        Ok(())
    }

    /// Slots currently held by this identity.
    pub async fn occupancy(&self) -> Result<u64> {
        self.counter.value().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn gate(capacity: u64) -> (Arc<MemoryStore>, Gate) {
        let store = Arc::new(MemoryStore::new());
        let gate = Gate::new(store.clone(), Identity::new("client-a"), capacity);
        (store, gate)
    }

    #[tokio::test]
    async fn test_acquire_up_to_capacity_then_rejects() {
        let (_store, gate) = gate(2);

        assert!(gate.acquire(1).await.unwrap());
        assert!(gate.acquire(1).await.unwrap());
        assert!(!gate.acquire(1).await.unwrap());
        assert_eq!(gate.occupancy().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_release_frees_a_slot() {
        let (_store, gate) = gate(2);

        assert!(gate.acquire(1).await.unwrap());
        assert!(gate.acquire(1).await.unwrap());
        assert!(!gate.acquire(1).await.unwrap());

        gate.release(1).await.unwrap();
        assert!(gate.acquire(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_excess_release_clamps_at_zero() {
        let (store, gate) = gate(2);

        assert!(gate.acquire(1).await.unwrap());
        gate.release(1).await.unwrap();
        gate.release(1).await.unwrap();
        gate.release(1).await.unwrap();

        assert_eq!(gate.occupancy().await.unwrap(), 0);
        assert_eq!(store.get("gate:slots:client-a").await.unwrap(), Some(0));

        // Next acquires behave as if occupancy were zero.
        assert!(gate.acquire(1).await.unwrap());
        assert!(gate.acquire(1).await.unwrap());
        assert!(!gate.acquire(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_weighted_acquire() {
        let (_store, gate) = gate(4);

        assert!(gate.acquire(3).await.unwrap());
        assert!(!gate.acquire(2).await.unwrap());
        assert!(gate.acquire(1).await.unwrap());

        gate.release(4).await.unwrap();
        assert_eq!(gate.occupancy().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_distinct_identities_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let a = Gate::new(store.clone(), Identity::new("client-a"), 1);
        let b = Gate::new(store.clone(), Identity::new("client-b"), 1);

        assert!(a.acquire(1).await.unwrap());
        assert!(!a.acquire(1).await.unwrap());
        assert!(b.acquire(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_acquire_leaves_occupancy_unchanged() {
        let (_store, gate) = gate(2);

        assert!(gate.acquire(2).await.unwrap());
        assert!(!gate.acquire(5).await.unwrap());
        assert_eq!(gate.occupancy().await.unwrap(), 2);
    }
}
