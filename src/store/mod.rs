//! Counter store abstraction.
//!
//! The store is the only synchronization point between the processes
//! enforcing a limit. Correctness of the admission protocol rests entirely
//! on the store's per-key atomic primitives; no in-process locking is
//! involved.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;

/// Contract for the shared, external counter store.
///
/// Implementations must apply `incr_by`, `decr_by`, and `compare_and_swap`
/// as one indivisible read-modify-write per key, even under concurrent
/// callers across process boundaries. An absent key is treated as zero by
/// all arithmetic operations. Stores that persist values as text must
/// coerce corrupt or non-numeric values to absent rather than failing the
/// read.
///
/// No retry or backoff happens at this layer: a round trip either succeeds
/// or its failure is surfaced immediately as
/// [`FloodgateError::Store`](crate::error::FloodgateError::Store).
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the current value, or `None` if the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    /// Unconditionally set the value.
    async fn set(&self, key: &str, value: i64) -> Result<()>;

    /// Atomically add `amount` and return the new value.
    async fn incr_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// Atomically subtract `amount` and return the new value.
    ///
    /// The result may go negative; callers that need a floor apply it
    /// themselves (see
    /// [`AdmissionCounter::drain`](crate::admission::AdmissionCounter::drain)).
    async fn decr_by(&self, key: &str, amount: i64) -> Result<i64>;

    /// Atomically replace the value with `new` if it currently equals
    /// `expected`, returning whether the swap happened.
    ///
    /// An absent key compares equal to zero.
    async fn compare_and_swap(&self, key: &str, expected: i64, new: i64) -> Result<bool>;
}
