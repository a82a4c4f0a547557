//! Admission gate: a counting permit limiter with RAII permits.
//!
//! The gate bounds how many callers may be "inside" a phase at once. The
//! capacities in this crate are load-bearing for correctness, not throttling:
//! the hydrogen gate (capacity 2) and oxygen gate (capacity 1) are what keep
//! a rendezvous batch from ever holding three hydrogens or two oxygens.
//!
//! # Ordering Contract
//!
//! A permit is returned only when its [`GatePermit`] drops. Callers that
//! must hold their slot across a later blocking step (the barrier wait)
//! simply keep the permit alive until that step returns; the gate itself
//! never recycles a held slot.
//!
//! # Fairness
//!
//! Waiters queue FIFO, so starvation is bounded: each release admits the
//! waiter at the head of the queue. Several sleepers may wake to re-check,
//! but at most one is admitted per release.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex as StdMutex};
use std::time::Duration;

use crate::cx::Cx;

/// Error returned when a blocking acquire fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// Cancelled while waiting for a permit.
    Cancelled,
}

impl std::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "gate acquire cancelled"),
        }
    }
}

impl std::error::Error for AcquireError {}

/// Error returned when a non-blocking acquire finds no free permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryAcquireError;

impl std::fmt::Display for TryAcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no gate permits available")
    }
}

impl std::error::Error for TryAcquireError {}

#[derive(Debug)]
struct GateState {
    /// Number of free permits, `0..=capacity`.
    available: usize,
    /// FIFO queue of waiter ids.
    waiters: VecDeque<u64>,
    /// Next waiter id.
    next_waiter_id: u64,
}

/// A counting permit limiter bounding concurrent holders to a capacity.
#[derive(Debug)]
pub struct AdmissionGate {
    capacity: usize,
    state: StdMutex<GateState>,
    cvar: Condvar,
}

impl AdmissionGate {
    /// Creates a gate with the given permit capacity.
    ///
    /// # Panics
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "admission gate requires at least 1 permit");
        Self {
            capacity,
            state: StdMutex::new(GateState {
                available: capacity,
                waiters: VecDeque::new(),
                next_waiter_id: 0,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Returns the fixed permit capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of currently free permits.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.state.lock().expect("gate lock poisoned").available
    }

    /// Returns the number of callers queued for a permit.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().expect("gate lock poisoned").waiters.len()
    }

    /// Acquires a permit, blocking until one is free.
    ///
    /// Admission is FIFO with respect to other blocked acquirers. The permit
    /// is returned to the gate when the guard drops.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireError::Cancelled`] if `cx` is cancelled while
    /// waiting; a cancelled acquire has consumed no permit and left no
    /// queue entry.
    pub fn acquire(&self, cx: &Cx) -> Result<GatePermit<'_>, AcquireError> {
        cx.trace("gate::acquire starting");
        if cx.checkpoint().is_err() {
            cx.trace("gate::acquire cancelled");
            return Err(AcquireError::Cancelled);
        }
        let mut state = self.state.lock().expect("gate lock poisoned");

        // Fast path: free permit and nobody queued ahead.
        if state.waiters.is_empty() && state.available > 0 {
            state.available -= 1;
            drop(state);
            cx.trace("gate::acquire admitted");
            return Ok(GatePermit { gate: self });
        }

        let waiter_id = state.next_waiter_id;
        state.next_waiter_id = state.next_waiter_id.wrapping_add(1);
        state.waiters.push_back(waiter_id);

        loop {
            if state.available > 0 && state.waiters.front() == Some(&waiter_id) {
                state.available -= 1;
                state.waiters.pop_front();
                // A second free permit can admit the next waiter in line.
                if state.available > 0 && !state.waiters.is_empty() {
                    self.cvar.notify_all();
                }
                drop(state);
                cx.trace("gate::acquire admitted");
                return Ok(GatePermit { gate: self });
            }

            if cx.checkpoint().is_err() {
                if let Some(pos) = state.waiters.iter().position(|&id| id == waiter_id) {
                    state.waiters.remove(pos);
                }
                // Our departure may expose an admissible head.
                if state.available > 0 && !state.waiters.is_empty() {
                    self.cvar.notify_all();
                }
                drop(state);
                cx.trace("gate::acquire cancelled");
                return Err(AcquireError::Cancelled);
            }

            let (guard, _) = self
                .cvar
                .wait_timeout(state, Duration::from_millis(10))
                .expect("gate lock poisoned");
            state = guard;
        }
    }

    /// Acquires a permit without blocking.
    ///
    /// Queued waiters keep priority: this fails while any acquirer is
    /// blocked, even if a permit is momentarily free.
    ///
    /// # Errors
    ///
    /// Returns [`TryAcquireError`] if no permit can be taken immediately.
    pub fn try_acquire(&self) -> Result<GatePermit<'_>, TryAcquireError> {
        let mut state = self.state.lock().expect("gate lock poisoned");
        if !state.waiters.is_empty() || state.available == 0 {
            return Err(TryAcquireError);
        }
        state.available -= 1;
        Ok(GatePermit { gate: self })
    }

    /// Returns a permit to the gate. Called by `GatePermit::drop`.
    fn release(&self) {
        let mut state = self.state.lock().expect("gate lock poisoned");
        debug_assert!(
            state.available < self.capacity,
            "gate permit released more times than acquired"
        );
        state.available += 1;
        self.cvar.notify_all();
    }
}

/// A held permit; the slot returns to the gate when this drops.
#[must_use = "the permit returns to the gate immediately if not held"]
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}
