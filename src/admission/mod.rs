//! Admission control primitives.
//!
//! [`Throttle`] bounds request rate per caller with a leaky bucket;
//! [`Gate`] bounds simultaneous in-flight requests per caller with fixed
//! slots. Both share the atomic counter protocol in [`counter`], and both
//! are stateless coordinators over a shared [`CounterStore`](crate::store::CounterStore).

pub mod counter;
pub mod gate;
pub mod manager;
pub mod throttle;

pub use counter::AdmissionCounter;
pub use gate::Gate;
pub use manager::AdmissionControl;
pub use throttle::Throttle;
