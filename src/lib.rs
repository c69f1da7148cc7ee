//! Floodgate - Fleet-Wide Admission Control
//!
//! This crate implements the two admission-control primitives shared by a
//! fleet of stateless request handlers: a leaky-bucket throttle bounding
//! request rate per caller, and a fixed-slot gate bounding simultaneous
//! in-flight requests per caller. Both coordinate through a shared, external
//! counter store, so no single process holds authoritative state.

pub mod admission;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod store;
