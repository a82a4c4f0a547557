//! Molecule synchronizer: bounded admission composed with a triple rendezvous.
//!
//! Water assembly is a grouping protocol, not a data structure: hydrogen and
//! oxygen workers arrive independently and the synchronizer releases them in
//! complete {H, H, O} batches. Two [`AdmissionGate`]s bound how many of each
//! element can be inside a batch (2 hydrogen, 1 oxygen) and one shared
//! [`RendezvousBarrier`] with 3 parties forms the batch itself.
//!
//! The per-call protocol is fixed:
//!
//! 1. acquire the element's gate (may block);
//! 2. invoke the caller's `emit` callback;
//! 3. wait at the shared barrier (may block);
//! 4. return the gate slot, strictly after the wait.
//!
//! Step 4 is what makes the element counts exact: a hydrogen slot freed
//! before the trip would let a third hydrogen emit into the current batch.
//! Because emission (step 2) strictly precedes the wait (step 3), the three
//! emissions observed between consecutive trips are exactly the tripped
//! batch's multiset.

use crate::cx::Cx;
use crate::sync::{AcquireError, AdmissionGate, BarrierWaitError, RendezvousBarrier};

/// Hydrogen units per molecule; the hydrogen gate's capacity.
pub const HYDROGEN_PER_MOLECULE: usize = 2;
/// Oxygen units per molecule; the oxygen gate's capacity.
pub const OXYGEN_PER_MOLECULE: usize = 1;
/// Total units per molecule; the barrier's party count.
pub const ATOMS_PER_MOLECULE: usize = HYDROGEN_PER_MOLECULE + OXYGEN_PER_MOLECULE;

/// The two element kinds the synchronizer groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// A hydrogen unit; two per molecule.
    Hydrogen,
    /// An oxygen unit; one per molecule.
    Oxygen,
}

impl Element {
    /// Single-character tag for logs and emission transcripts.
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Self::Hydrogen => 'H',
            Self::Oxygen => 'O',
        }
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Error returned when a bond call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondError {
    /// Cancelled while blocked in admission or at the rendezvous.
    Cancelled,
}

impl std::fmt::Display for BondError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "bond cancelled"),
        }
    }
}

impl std::error::Error for BondError {}

impl From<AcquireError> for BondError {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<BarrierWaitError> for BondError {
    fn from(err: BarrierWaitError) -> Self {
        match err {
            BarrierWaitError::Cancelled => Self::Cancelled,
        }
    }
}

/// Proof of a completed bond: which element, in which molecule, and whether
/// this caller's arrival tripped the rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BondReceipt {
    /// The element this caller contributed.
    pub element: Element,
    /// Generation of the trip that completed this caller's molecule.
    /// All three members of one molecule share it.
    pub generation: u64,
    /// True for exactly one member of each molecule.
    pub led_trip: bool,
}

/// Groups concurrent hydrogen and oxygen callers into exact {H, H, O} batches.
#[derive(Debug)]
pub struct MoleculeSynchronizer {
    hydrogen_gate: AdmissionGate,
    oxygen_gate: AdmissionGate,
    barrier: RendezvousBarrier,
}

impl MoleculeSynchronizer {
    /// Creates a synchronizer with empty batches and full gates.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hydrogen_gate: AdmissionGate::new(HYDROGEN_PER_MOLECULE),
            oxygen_gate: AdmissionGate::new(OXYGEN_PER_MOLECULE),
            barrier: RendezvousBarrier::new(ATOMS_PER_MOLECULE),
        }
    }

    /// Number of molecules assembled so far (completed trips).
    #[must_use]
    pub fn assembled_molecules(&self) -> u64 {
        self.barrier.generation()
    }

    /// Free hydrogen slots in the batch currently forming.
    #[must_use]
    pub fn available_hydrogen_permits(&self) -> usize {
        self.hydrogen_gate.available_permits()
    }

    /// Free oxygen slots in the batch currently forming.
    #[must_use]
    pub fn available_oxygen_permits(&self) -> usize {
        self.oxygen_gate.available_permits()
    }

    /// Contributes one hydrogen unit, blocking until its molecule completes.
    ///
    /// `emit` runs after this caller is admitted and before it waits for its
    /// two partners, so an external observer sees each molecule's three
    /// emissions contiguously between trips.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::Cancelled`] if `cx` is cancelled while blocked.
    /// A cancelled call has returned its gate slot and retracted any barrier
    /// arrival; note `emit` has already run if admission succeeded.
    pub fn bond_hydrogen<F: FnOnce()>(&self, cx: &Cx, emit: F) -> Result<BondReceipt, BondError> {
        self.bond(Element::Hydrogen, &self.hydrogen_gate, cx, emit)
    }

    /// Contributes one oxygen unit, blocking until its molecule completes.
    ///
    /// # Errors
    ///
    /// Returns [`BondError::Cancelled`] if `cx` is cancelled while blocked;
    /// see [`bond_hydrogen`](Self::bond_hydrogen) for the cleanup contract.
    pub fn bond_oxygen<F: FnOnce()>(&self, cx: &Cx, emit: F) -> Result<BondReceipt, BondError> {
        self.bond(Element::Oxygen, &self.oxygen_gate, cx, emit)
    }

    fn bond<F: FnOnce()>(
        &self,
        element: Element,
        gate: &AdmissionGate,
        cx: &Cx,
        emit: F,
    ) -> Result<BondReceipt, BondError> {
        let permit = gate.acquire(cx)?;
        emit();
        // An early return here still releases the permit after the wait has
        // resolved, which is the only ordering the batch counts rely on.
        let result = self.barrier.wait(cx)?;
        drop(permit);
        Ok(BondReceipt {
            element,
            generation: result.generation(),
            led_trip: result.is_leader(),
        })
    }
}

impl Default for MoleculeSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cx::CancelReason;
    use crate::test_utils::{cancelled_cx, init_test_logging, test_cx};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    type WorkerHandles = Vec<std::thread::JoinHandle<Result<BondReceipt, BondError>>>;

    fn spawn_workers(
        sync: &Arc<MoleculeSynchronizer>,
        molecules: usize,
    ) -> (WorkerHandles, Arc<Mutex<Vec<Element>>>) {
        let log: Arc<Mutex<Vec<Element>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for _ in 0..molecules * HYDROGEN_PER_MOLECULE {
            let sync = Arc::clone(sync);
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                let cx = test_cx();
                sync.bond_hydrogen(&cx, || log.lock().unwrap().push(Element::Hydrogen))
            }));
        }
        for _ in 0..molecules * OXYGEN_PER_MOLECULE {
            let sync = Arc::clone(sync);
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                let cx = test_cx();
                sync.bond_oxygen(&cx, || log.lock().unwrap().push(Element::Oxygen))
            }));
        }
        (handles, log)
    }

    #[test]
    fn single_molecule_assembles() {
        init_test("single_molecule_assembles");
        let sync = Arc::new(MoleculeSynchronizer::new());

        let (handles, log) = spawn_workers(&sync, 1);
        let receipts: Vec<BondReceipt> = handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked").expect("bond failed"))
            .collect();

        crate::assert_with_log!(receipts.len() == 3, "three bonds", 3usize, receipts.len());
        let emitted = log.lock().unwrap().len();
        crate::assert_with_log!(emitted == 3, "three emissions", 3usize, emitted);
        let same_gen = receipts.iter().all(|r| r.generation == 0);
        crate::assert_with_log!(same_gen, "one molecule", true, same_gen);
        let leaders = receipts.iter().filter(|r| r.led_trip).count();
        crate::assert_with_log!(leaders == 1, "one leader", 1usize, leaders);
        let hydrogens = receipts
            .iter()
            .filter(|r| r.element == Element::Hydrogen)
            .count();
        crate::assert_with_log!(hydrogens == 2, "two hydrogens", 2usize, hydrogens);
        crate::assert_with_log!(
            sync.assembled_molecules() == 1,
            "trip counted",
            1u64,
            sync.assembled_molecules()
        );
        crate::test_complete!("single_molecule_assembles");
    }

    #[test]
    fn receipts_group_into_exact_molecules() {
        init_test("receipts_group_into_exact_molecules");
        let sync = Arc::new(MoleculeSynchronizer::new());
        let molecules = 5;

        let (handles, log) = spawn_workers(&sync, molecules);
        let receipts: Vec<BondReceipt> = handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked").expect("bond failed"))
            .collect();

        let emissions = log.lock().unwrap().clone();
        let hydrogens_emitted = emissions
            .iter()
            .filter(|&&e| e == Element::Hydrogen)
            .count();
        crate::assert_with_log!(
            emissions.len() == molecules * ATOMS_PER_MOLECULE,
            "emission count",
            molecules * ATOMS_PER_MOLECULE,
            emissions.len()
        );
        crate::assert_with_log!(
            hydrogens_emitted == molecules * HYDROGEN_PER_MOLECULE,
            "hydrogen emissions",
            molecules * HYDROGEN_PER_MOLECULE,
            hydrogens_emitted
        );

        let mut by_generation: HashMap<u64, Vec<BondReceipt>> = HashMap::new();
        for receipt in receipts {
            by_generation.entry(receipt.generation).or_default().push(receipt);
        }

        crate::assert_with_log!(
            by_generation.len() == molecules,
            "distinct generations",
            molecules,
            by_generation.len()
        );
        for (generation, group) in &by_generation {
            crate::test_section!(format!("generation {generation}"));
            let hydrogens = group
                .iter()
                .filter(|r| r.element == Element::Hydrogen)
                .count();
            let oxygens = group.iter().filter(|r| r.element == Element::Oxygen).count();
            let leaders = group.iter().filter(|r| r.led_trip).count();
            crate::assert_with_log!(group.len() == 3, "group size", 3usize, group.len());
            crate::assert_with_log!(hydrogens == 2, "two hydrogens", 2usize, hydrogens);
            crate::assert_with_log!(oxygens == 1, "one oxygen", 1usize, oxygens);
            crate::assert_with_log!(leaders == 1, "one leader", 1usize, leaders);
        }
        crate::assert_with_log!(
            sync.assembled_molecules() == molecules as u64,
            "trips counted",
            molecules as u64,
            sync.assembled_molecules()
        );
        crate::test_complete!("receipts_group_into_exact_molecules");
    }

    #[test]
    fn emissions_happen_between_admission_and_release() {
        init_test("emissions_happen_between_admission_and_release");
        let sync = Arc::new(MoleculeSynchronizer::new());
        let emitted = Arc::new(AtomicBool::new(false));

        let emitted_clone = Arc::clone(&emitted);
        let sync_clone = Arc::clone(&sync);
        let hydrogen = std::thread::spawn(move || {
            let cx = test_cx();
            sync_clone.bond_hydrogen(&cx, || emitted_clone.store(true, Ordering::SeqCst))
        });

        // The lone hydrogen blocks at the barrier, but its emission has
        // already happened.
        std::thread::sleep(std::time::Duration::from_millis(20));
        crate::assert_with_log!(
            emitted.load(Ordering::SeqCst),
            "emitted before trip",
            true,
            emitted.load(Ordering::SeqCst)
        );
        crate::assert_with_log!(
            sync.assembled_molecules() == 0,
            "no trip yet",
            0u64,
            sync.assembled_molecules()
        );

        // Complete the molecule: one more hydrogen and one oxygen.
        let sync_clone = Arc::clone(&sync);
        let second_hydrogen = std::thread::spawn(move || {
            let cx = test_cx();
            sync_clone.bond_hydrogen(&cx, || {})
        });
        let sync_clone = Arc::clone(&sync);
        let oxygen = std::thread::spawn(move || {
            let cx = test_cx();
            sync_clone.bond_oxygen(&cx, || {})
        });

        let first = hydrogen.join().expect("worker panicked").expect("bond failed");
        let second = second_hydrogen
            .join()
            .expect("worker panicked")
            .expect("bond failed");
        let third = oxygen.join().expect("worker panicked").expect("bond failed");

        crate::assert_with_log!(first.generation == 0, "first generation", 0u64, first.generation);
        crate::assert_with_log!(
            second.generation == 0,
            "second generation",
            0u64,
            second.generation
        );
        crate::assert_with_log!(third.generation == 0, "third generation", 0u64, third.generation);
        crate::assert_with_log!(
            sync.assembled_molecules() == 1,
            "one trip",
            1u64,
            sync.assembled_molecules()
        );
        crate::test_complete!("emissions_happen_between_admission_and_release");
    }

    #[test]
    fn precancelled_bond_fails_before_emitting() {
        init_test("precancelled_bond_fails_before_emitting");
        let sync = MoleculeSynchronizer::new();
        let emitted = AtomicBool::new(false);

        let cx = cancelled_cx();
        let err = sync
            .bond_hydrogen(&cx, || emitted.store(true, Ordering::SeqCst))
            .expect_err("expected cancellation");

        crate::assert_with_log!(err == BondError::Cancelled, "cancelled", BondError::Cancelled, err);
        crate::assert_with_log!(
            !emitted.load(Ordering::SeqCst),
            "no emission without admission",
            false,
            emitted.load(Ordering::SeqCst)
        );
        crate::assert_with_log!(
            sync.available_hydrogen_permits() == HYDROGEN_PER_MOLECULE,
            "no slot consumed",
            HYDROGEN_PER_MOLECULE,
            sync.available_hydrogen_permits()
        );
        crate::test_complete!("precancelled_bond_fails_before_emitting");
    }

    #[test]
    fn cancelled_bond_returns_slot_and_batch_survives() {
        init_test("cancelled_bond_returns_slot_and_batch_survives");
        let sync = Arc::new(MoleculeSynchronizer::new());

        let cx = test_cx();
        let cx_clone = cx.clone();
        let sync_clone = Arc::clone(&sync);
        let doomed = std::thread::spawn(move || sync_clone.bond_hydrogen(&cx_clone, || {}));

        // Let it park at the barrier, then cancel it out.
        std::thread::sleep(std::time::Duration::from_millis(20));
        cx.cancel(CancelReason::shutdown());
        let result = doomed.join().expect("worker panicked");
        let cancelled = matches!(result, Err(BondError::Cancelled));
        crate::assert_with_log!(cancelled, "cancelled mid-wait", true, cancelled);
        crate::assert_with_log!(
            sync.available_hydrogen_permits() == HYDROGEN_PER_MOLECULE,
            "slot returned",
            HYDROGEN_PER_MOLECULE,
            sync.available_hydrogen_permits()
        );

        // A fresh trio still assembles a complete molecule.
        let (handles, _log) = spawn_workers(&sync, 1);
        let receipts: Vec<BondReceipt> = handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked").expect("bond failed"))
            .collect();
        crate::assert_with_log!(receipts.len() == 3, "batch intact", 3usize, receipts.len());
        crate::assert_with_log!(
            sync.assembled_molecules() == 1,
            "molecule assembled",
            1u64,
            sync.assembled_molecules()
        );
        crate::test_complete!("cancelled_bond_returns_slot_and_batch_survives");
    }

    #[test]
    fn element_tags() {
        init_test("element_tags");
        crate::assert_with_log!(
            Element::Hydrogen.tag() == 'H',
            "hydrogen tag",
            'H',
            Element::Hydrogen.tag()
        );
        crate::assert_with_log!(
            Element::Oxygen.tag() == 'O',
            "oxygen tag",
            'O',
            Element::Oxygen.tag()
        );
        crate::assert_with_log!(
            Element::Oxygen.to_string() == "O",
            "display matches tag",
            "O",
            Element::Oxygen.to_string()
        );
        crate::test_complete!("element_tags");
    }
}
