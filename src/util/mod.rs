//! Internal utilities for the aquasync harness.
//!
//! Intentionally minimal and dependency-free so that assembly schedules stay
//! reproducible from a seed.

pub mod rng;

pub use rng::Xorshift64;
