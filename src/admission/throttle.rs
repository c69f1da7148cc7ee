//! Leaky-bucket request throttle.
//!
//! Load accumulates in a per-identity drop counter and drains at a constant
//! rate: a bucket of `capacity` drops empties completely over `leak_window`.
//! A request is admitted while its drops fit under capacity. All state lives
//! in the shared counter store, so any number of processes can enforce the
//! same limit; the throttle itself holds only configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::counter::AdmissionCounter;
use crate::clock::Clock;
use crate::config::FailurePolicy;
use crate::error::Result;
use crate::identity::Identity;
use crate::store::CounterStore;

/// Default key prefix for throttle counters.
const DEFAULT_PREFIX: &str = "throttle";

/// A leaky-bucket throttle for a single caller identity.
pub struct Throttle {
    counter: AdmissionCounter,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    identity: Identity,
    capacity: u64,
    leak_window: Duration,
    last_leak_key: String,
}

impl Throttle {
    /// Create a throttle under the default key prefix.
    ///
    /// `capacity` is the number of drop units the bucket holds and
    /// `leak_window` the time for a full bucket to empty. A bucket of 3
    /// leaking over 5 seconds admits 3 requests per 5-second window.
    pub fn new(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        identity: Identity,
        capacity: u64,
        leak_window: Duration,
    ) -> Self {
        Self::with_prefix(store, clock, identity, capacity, leak_window, DEFAULT_PREFIX)
    }

    /// Create a throttle under a custom key prefix.
    ///
    /// Throttles with different capacity or window must never share an
    /// identity and prefix, or their leak math will disagree on the same
    /// counters. Distinct prefixes also keep throttle state from ever
    /// colliding with gate state for the same identity.
    pub fn with_prefix(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        identity: Identity,
        capacity: u64,
        leak_window: Duration,
        prefix: &str,
    ) -> Self {
        let drops_key = format!("{}:drops:{}", prefix, identity);
        let last_leak_key = format!("{}:leak:{}", prefix, identity);

        Self {
            counter: AdmissionCounter::new(store.clone(), drops_key),
            store,
            clock,
            identity,
            capacity,
            leak_window,
            last_leak_key,
        }
    }

    /// The identity this throttle tracks.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Maximum drop units the bucket holds.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Time for a full bucket to empty.
    pub fn leak_window(&self) -> Duration {
        self.leak_window
    }

    /// Age out drops that have expired since the last leak.
    ///
    /// Leaks `round(elapsed * capacity / leak_window)` drops, floor-clamped
    /// at zero by the counter drain. Sub-half-drop elapsed windows skip the
    /// store write entirely and leave the leak timestamp untouched, so the
    /// fractional time keeps accruing; the resulting staircase cadence under
    /// sustained load is deliberate. Idempotent when called repeatedly
    /// within the same second.
    pub async fn leak(&self) -> Result<()> {
        let now = self.clock.now();
        let last_leak = match self.store.get(&self.last_leak_key).await? {
            Some(t) if t >= 0 => t as u64,
            _ => {
                // First sighting of this identity: anchor the leak clock.
                self.store.set(&self.last_leak_key, now as i64).await?;
                now
            }
        };

        let elapsed = now.saturating_sub(last_leak);
        let drops_to_leak = (elapsed as f64 * self.capacity as f64
            / self.leak_window.as_secs() as f64)
            .round() as u64;

        if drops_to_leak < 1 {
            return Ok(());
        }

        // A bucket can never leak more than it can ever hold.
        let drops_to_leak = drops_to_leak.min(self.capacity);

        let remaining = self.counter.drain(drops_to_leak).await?;
        self.store.set(&self.last_leak_key, now as i64).await?;

        trace!(
            identity = %self.identity,
            drops_to_leak,
            remaining,
            "Leaked expired drops"
        );
        Ok(())
    }

    /// Attempt to add `drops` units of load for this identity.
    ///
    /// Returns `Ok(true)` when the bucket has room after aging out expired
    /// load. The decision is a single atomic increment-and-fetch against the
    /// shared store, rolled back on overflow (see
    /// [`AdmissionCounter::admit`]), so concurrent callers can never drive
    /// the settled count above capacity.
    pub async fn try_admit(&self, drops: u32) -> Result<bool> {
        self.leak().await?;

        let admitted = self.counter.admit(drops, self.capacity).await?;
        if !admitted {
            debug!(identity = %self.identity, drops, "Throttle rejected drops");
        }
        Ok(admitted)
    }

    /// Like [`try_admit`](Self::try_admit), but resolve store failures per
    /// `policy` instead of propagating them.
    pub async fn try_admit_or(&self, drops: u32, policy: FailurePolicy) -> bool {
        match self.try_admit(drops).await {
            Ok(admitted) => admitted,
            Err(e) => {
                warn!(
                    identity = %self.identity,
                    error = %e,
                    policy = ?policy,
                    "Counter store failure during throttle admission"
                );
                policy.admit_on_failure()
            }
        }
    }

    /// Remaining room in the bucket after aging out expired load.
    ///
    /// Reported as a floor-clamped subtraction: a transient over-capacity
    /// count (possible between a competing caller's increment and rollback)
    /// reads as zero rather than a small positive remainder.
    pub async fn capacity_left(&self) -> Result<u64> {
        self.leak().await?;
        let used = self.counter.value().await?;
        Ok(self.capacity.saturating_sub(used))
    }

    /// Drop units currently charged against capacity, after aging out
    /// expired load.
    pub async fn capacity_used(&self) -> Result<u64> {
        self.leak().await?;
        self.counter.value().await
    }

    /// Whether any further drop would be rejected right now.
    pub async fn is_full(&self) -> Result<bool> {
        self.leak().await?;
        Ok(self.counter.value().await? >= self.capacity)
    }

    /// Empty the bucket, resetting the rate limit for this identity.
    ///
    /// Leaves the last-leak timestamp untouched.
    pub async fn flush(&self) -> Result<()> {
        self.counter.reset().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn throttle(
        capacity: u64,
        leak_window_secs: u64,
    ) -> (Arc<MemoryStore>, Arc<ManualClock>, Throttle) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let throttle = Throttle::new(
            store.clone(),
            clock.clone(),
            Identity::new("client-a"),
            capacity,
            Duration::from_secs(leak_window_secs),
        );
        (store, clock, throttle)
    }

    #[tokio::test]
    async fn test_admits_up_to_capacity_then_rejects() {
        let (_store, _clock, throttle) = throttle(3, 5);

        let mut results = Vec::new();
        for _ in 0..6 {
            results.push(throttle.try_admit(1).await.unwrap());
        }

        assert_eq!(results, vec![true, true, true, false, false, false]);
    }

    #[tokio::test]
    async fn test_full_leak_after_window() {
        let (_store, clock, throttle) = throttle(3, 5);

        for _ in 0..3 {
            assert!(throttle.try_admit(1).await.unwrap());
        }
        assert!(throttle.is_full().await.unwrap());

        clock.advance(5);
        assert_eq!(throttle.capacity_used().await.unwrap(), 0);
        assert!(throttle.try_admit(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_partial_leak_staircase() {
        let (_store, clock, throttle) = throttle(3, 5);

        for _ in 0..3 {
            assert!(throttle.try_admit(1).await.unwrap());
        }

        // 2 seconds of a 3-per-5s bucket leaks round(1.2) = 1 drop.
        clock.advance(2);
        assert_eq!(throttle.capacity_used().await.unwrap(), 2);
        assert!(throttle.try_admit(1).await.unwrap());
        assert!(!throttle.try_admit(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_sub_half_drop_elapsed_leaks_nothing() {
        let (store, clock, throttle) = throttle(1, 5);

        assert!(throttle.try_admit(1).await.unwrap());
        let anchored = store.get("throttle:leak:client-a").await.unwrap();

        // 2s of a 1-per-5s bucket is 0.4 drops: below the rounding
        // threshold, so no leak and no timestamp update.
        clock.advance(2);
        assert_eq!(throttle.capacity_used().await.unwrap(), 1);
        assert_eq!(store.get("throttle:leak:client-a").await.unwrap(), anchored);

        // Another 1s accrues to 0.6 drops, which rounds up to a full leak.
        clock.advance(1);
        assert_eq!(throttle.capacity_used().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_leak_idempotent_within_same_second() {
        let (_store, clock, throttle) = throttle(3, 5);

        for _ in 0..3 {
            assert!(throttle.try_admit(1).await.unwrap());
        }

        clock.advance(2);
        throttle.leak().await.unwrap();
        let after_one = throttle.capacity_used().await.unwrap();
        throttle.leak().await.unwrap();
        assert_eq!(throttle.capacity_used().await.unwrap(), after_one);
    }

    #[tokio::test]
    async fn test_left_plus_used_equals_capacity() {
        let (_store, _clock, throttle) = throttle(5, 10);

        for charged in 1..=5u64 {
            assert!(throttle.try_admit(1).await.unwrap());
            let left = throttle.capacity_left().await.unwrap();
            let used = throttle.capacity_used().await.unwrap();
            assert_eq!(left + used, 5);
            assert_eq!(used, charged);
        }
    }

    #[tokio::test]
    async fn test_capacity_left_clamped_when_over_capacity() {
        let (store, _clock, throttle) = throttle(3, 5);

        // Simulate the transient overshoot window: the raw counter briefly
        // reads above capacity before a competing caller's rollback lands.
        // Floor-clamped subtraction reports zero here, not the small
        // positive remainder the source's abs() would have produced.
        store.set("throttle:drops:client-a", 5).await.unwrap();
        store
            .set("throttle:leak:client-a", 1_700_000_000)
            .await
            .unwrap();

        assert_eq!(throttle.capacity_left().await.unwrap(), 0);
        assert!(throttle.is_full().await.unwrap());
    }

    #[tokio::test]
    async fn test_flush_empties_bucket() {
        let (store, _clock, throttle) = throttle(3, 5);

        for _ in 0..3 {
            assert!(throttle.try_admit(1).await.unwrap());
        }
        let anchored = store.get("throttle:leak:client-a").await.unwrap();

        throttle.flush().await.unwrap();
        assert_eq!(throttle.capacity_used().await.unwrap(), 0);
        assert!(throttle.try_admit(1).await.unwrap());

        // Flush resets drops only, never the leak timestamp.
        assert_eq!(store.get("throttle:leak:client-a").await.unwrap(), anchored);
    }

    #[tokio::test]
    async fn test_weighted_drops() {
        let (_store, _clock, throttle) = throttle(5, 10);

        assert!(throttle.try_admit(4).await.unwrap());
        assert!(!throttle.try_admit(2).await.unwrap());
        assert!(throttle.try_admit(1).await.unwrap());
        assert_eq!(throttle.capacity_used().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_distinct_identities_are_independent() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let a = Throttle::new(
            store.clone(),
            clock.clone(),
            Identity::new("client-a"),
            2,
            Duration::from_secs(5),
        );
        let b = Throttle::new(
            store.clone(),
            clock.clone(),
            Identity::new("client-b"),
            2,
            Duration::from_secs(5),
        );

        assert!(a.try_admit(2).await.unwrap());
        assert!(!a.try_admit(1).await.unwrap());
        assert!(b.try_admit(1).await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_prefixes_do_not_collide() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let identity = Identity::new("client-a");
        let per_second = Throttle::with_prefix(
            store.clone(),
            clock.clone(),
            identity.clone(),
            1,
            Duration::from_secs(1),
            "burst",
        );
        let per_minute = Throttle::with_prefix(
            store.clone(),
            clock.clone(),
            identity,
            10,
            Duration::from_secs(60),
            "sustained",
        );

        assert!(per_second.try_admit(1).await.unwrap());
        assert!(!per_second.try_admit(1).await.unwrap());

        // The sustained bucket saw none of the burst bucket's drops.
        assert_eq!(per_minute.capacity_used().await.unwrap(), 0);
        assert!(per_minute.try_admit(1).await.unwrap());
    }
}
