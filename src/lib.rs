//! Aquasync: cancel-correct rendezvous synchronizer for assembling water molecules.
//!
//! # Overview
//!
//! Aquasync groups two independent pools of concurrent workers, hydrogen and
//! oxygen producers, into exact {H, H, O} batches. Workers arrive in any
//! order and at any speed; the synchronizer admits at most two hydrogen and
//! one oxygen into the batch being formed, lets each emit its unit, then
//! releases all three together through a reusable triple rendezvous.
//! Cancellation is a first-class protocol, not a silent drop: every blocking
//! operation takes a [`cx::Cx`] and unwinds cleanly when it fires.
//!
//! # Core Guarantees
//!
//! - **Exact composition**: every completed molecule holds two hydrogen units and one oxygen unit
//! - **All-or-none trips**: the rendezvous releases exactly three waiters per generation, never a partial batch
//! - **Ordered release**: a worker's admission slot recycles only after its own batch has tripped
//! - **Cancel-correctness**: a cancelled acquire consumed no permit; a cancelled wait retracted its arrival; a held permit always returns on drop
//! - **Deterministic testing**: harness jitter schedules derive from a seed and replay exactly
//!
//! # Module Structure
//!
//! - [`cx`]: Cancellation context and checkpoint protocol
//! - [`sync`]: Admission gate and rendezvous barrier primitives
//! - [`molecule`]: The molecule synchronizer composing the primitives
//! - [`harness`]: Worker pools, arrival plans, transcript validation
//! - [`util`]: Internal utilities (deterministic RNG)
//! - [`tracing_compat`]: Structured logging layer, feature-gated
//! - [`test_utils`]: Shared test helpers
//!
//! # Example
//!
//! ```
//! use aquasync::cx::Cx;
//! use aquasync::harness::{run_assembly, AssemblyConfig};
//! use std::time::Duration;
//!
//! let cx = Cx::new();
//! let config = AssemblyConfig::new(10).seed(7).max_jitter(Duration::from_millis(5));
//! let report = run_assembly(&cx, &config).expect("assembly failed");
//! assert_eq!(report.molecules_assembled, 10);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod cx;
pub mod harness;
pub mod molecule;
pub mod sync;
pub mod test_utils;
pub mod tracing_compat;
pub mod util;

// Re-exports for convenient access to core types
pub use cx::{CancelKind, CancelReason, Cancelled, Cx};
pub use harness::{
    run_assembly, validate_emissions, ArrivalPlan, AssemblyConfig, AssemblyError, AssemblyReport,
    EmissionLog, ValidationError, ValidationSummary,
};
pub use molecule::{
    BondError, BondReceipt, Element, MoleculeSynchronizer, ATOMS_PER_MOLECULE,
    HYDROGEN_PER_MOLECULE, OXYGEN_PER_MOLECULE,
};
pub use sync::{
    AcquireError, AdmissionGate, BarrierWaitError, BarrierWaitResult, GatePermit,
    RendezvousBarrier, TryAcquireError,
};
