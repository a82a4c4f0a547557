//! Reusable rendezvous barrier with batch generations.
//!
//! Unlike `std::sync::Barrier`, this barrier is built for repeated use by
//! the same set of roles: after every trip it resets itself and the next
//! batch of arrivals forms a fresh rendezvous. Each trip is stamped with a
//! monotonically increasing generation so callers can tell which batch they
//! completed in.
//!
//! # Batch Semantics
//!
//! Arrivals accumulate until `parties` callers are present; the last arrival
//! trips the barrier and all of them are released together. No caller is
//! ever released by a partial batch, and no caller can be carried over into
//! a later batch: the generation stamp it observes is the one current at
//! its own arrival.
//!
//! # Cancellation
//!
//! A waiter whose context is cancelled retracts its arrival and returns an
//! error, leaving the in-progress batch one arrival short but structurally
//! intact. If the batch trips in the same instant the waiter is being
//! cancelled, completion wins: the waiter was counted in a released batch
//! and reports success.

use std::sync::{Condvar, Mutex as StdMutex};
use std::time::Duration;

use crate::cx::Cx;

/// Error returned when a barrier wait fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierWaitError {
    /// Cancelled while waiting for the batch to fill.
    Cancelled,
}

impl std::fmt::Display for BarrierWaitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "barrier wait cancelled"),
        }
    }
}

impl std::error::Error for BarrierWaitError {}

/// Outcome of a completed barrier wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierWaitResult {
    generation: u64,
    is_leader: bool,
}

impl BarrierWaitResult {
    /// The generation of the batch this waiter completed in.
    ///
    /// All members of one batch observe the same generation; members of
    /// different batches never do.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True for exactly one member of each batch: the arrival that tripped
    /// the barrier.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.is_leader
    }
}

#[derive(Debug)]
struct BarrierState {
    /// Arrivals in the current batch, `0..parties`.
    arrived: usize,
    /// Completed-batch counter; incremented on every trip.
    generation: u64,
}

/// A reusable barrier releasing waiters in exact batches of `parties`.
#[derive(Debug)]
pub struct RendezvousBarrier {
    parties: usize,
    state: StdMutex<BarrierState>,
    cvar: Condvar,
}

impl RendezvousBarrier {
    /// Creates a barrier that trips once `parties` waiters have arrived.
    ///
    /// # Panics
    /// Panics if `parties == 0`.
    #[must_use]
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "rendezvous barrier requires at least 1 party");
        Self {
            parties,
            state: StdMutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Returns the batch size this barrier trips at.
    #[must_use]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Returns the number of arrivals in the current (untripped) batch.
    #[must_use]
    pub fn arrived(&self) -> usize {
        self.state.lock().expect("barrier lock poisoned").arrived
    }

    /// Returns the generation of the batch currently forming.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.lock().expect("barrier lock poisoned").generation
    }

    /// Arrives at the barrier and blocks until the batch is complete.
    ///
    /// The `parties`-th arrival trips the barrier, releases every waiter in
    /// the batch, and resets the barrier for the next batch. The tripping
    /// arrival reports `is_leader() == true`.
    ///
    /// # Errors
    ///
    /// Returns [`BarrierWaitError::Cancelled`] if `cx` is cancelled before
    /// the batch fills; the arrival is retracted so the remaining waiters
    /// still need a full batch. A context cancelled before arrival fails
    /// without arriving at all. Cancellation observed after the batch has
    /// already tripped is ignored in favor of the completed rendezvous.
    pub fn wait(&self, cx: &Cx) -> Result<BarrierWaitResult, BarrierWaitError> {
        cx.trace("barrier::wait arriving");
        if cx.checkpoint().is_err() {
            cx.trace("barrier::wait cancelled");
            return Err(BarrierWaitError::Cancelled);
        }
        let mut state = self.state.lock().expect("barrier lock poisoned");
        let local_gen = state.generation;
        state.arrived += 1;

        if state.arrived == self.parties {
            // Batch complete: reset and release everyone in it.
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            drop(state);
            self.cvar.notify_all();
            cx.trace("barrier::wait tripped as leader");
            return Ok(BarrierWaitResult {
                generation: local_gen,
                is_leader: true,
            });
        }

        loop {
            if state.generation != local_gen {
                drop(state);
                cx.trace("barrier::wait released");
                return Ok(BarrierWaitResult {
                    generation: local_gen,
                    is_leader: false,
                });
            }

            if cx.checkpoint().is_err() {
                // The batch may have tripped between the wakeup and this
                // check; completion wins over cancellation.
                if state.generation != local_gen {
                    drop(state);
                    cx.trace("barrier::wait released");
                    return Ok(BarrierWaitResult {
                        generation: local_gen,
                        is_leader: false,
                    });
                }
                state.arrived -= 1;
                drop(state);
                cx.trace("barrier::wait cancelled");
                return Err(BarrierWaitError::Cancelled);
            }

            let (guard, _) = self
                .cvar
                .wait_timeout(state, Duration::from_millis(10))
                .expect("barrier lock poisoned");
            state = guard;
        }
    }
}
