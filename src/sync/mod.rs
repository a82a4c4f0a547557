//! Synchronization primitives for bounded-admission rendezvous.
//!
//! This module provides the two cancel-aware primitives the molecule
//! synchronizer composes:
//!
//! - [`AdmissionGate`]: a counting permit limiter bounding concurrent
//!   holders to a fixed capacity. Permits are RAII guards; a slot returns
//!   to the gate when its [`GatePermit`] drops.
//! - [`RendezvousBarrier`]: a reusable N-way rendezvous point. Arrivals are
//!   released in atomic batches of exactly N, each batch identified by a
//!   generation index.
//!
//! # Cancel Safety
//!
//! Both primitives poll their [`Cx`](crate::cx::Cx) while blocked:
//!
//! - A cancelled `acquire` has consumed no permit and left no queue entry.
//! - A cancelled `wait` has retracted its arrival; it can never dent a
//!   batch that already tripped.
//! - A held permit is released on drop, cancelled or not.

mod barrier;
mod gate;

pub use barrier::{BarrierWaitError, BarrierWaitResult, RendezvousBarrier};
pub use gate::{AcquireError, AdmissionGate, GatePermit, TryAcquireError};
