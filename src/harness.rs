//! Assembly harness: spawns worker pools and validates their output.
//!
//! The harness is the driving side of the crate: it spawns `2k` hydrogen and
//! `k` oxygen workers against one [`MoleculeSynchronizer`], gives each an
//! emission callback recording into a shared [`EmissionLog`], joins them all,
//! and checks the result two independent ways:
//!
//! - **transcript validation** — the log, split into arrival-order triples,
//!   must contain exactly two H and one O per triple ([`validate_emissions`]);
//! - **receipt cross-check** — the per-worker [`BondReceipt`]s, grouped by
//!   generation, must form `k` groups of three with one trip leader each.
//!
//! Worker start times come from an [`ArrivalPlan`]: seeded random jitter (the
//! adversarial default) or one of the degenerate interleavings that historically
//! shake out ratio bugs. All randomness is a seeded [`Xorshift64`], so a
//! failing schedule replays exactly from its seed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::cx::Cx;
use crate::molecule::{
    BondError, BondReceipt, Element, MoleculeSynchronizer, ATOMS_PER_MOLECULE,
    HYDROGEN_PER_MOLECULE, OXYGEN_PER_MOLECULE,
};
use crate::tracing_compat::{debug, info};
use crate::util::Xorshift64;

/// Start offset separating the phases of the one-element-first plans.
const PHASE_OFFSET: Duration = Duration::from_millis(10);
/// Start spacing between consecutive arrivals of the alternating plan.
const ALTERNATION_STEP: Duration = Duration::from_millis(2);

/// Error returned when an assembly run fails outright.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// A worker thread panicked instead of reporting a bond outcome.
    #[error("{element} worker panicked")]
    WorkerPanicked {
        /// Element the panicked worker was contributing.
        element: Element,
    },
    /// The emission transcript failed triple validation.
    #[error("emission transcript invalid: {0}")]
    Validation(#[from] ValidationError),
}

/// Error returned when an emission transcript fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The transcript length is not a multiple of three.
    #[error("ragged transcript: {count} emissions do not form whole triples")]
    RaggedTranscript {
        /// Total emissions seen.
        count: usize,
    },
    /// A triple held the wrong element multiset.
    #[error("triple {index} is {transcript:?}, expected two H and one O")]
    MalformedTriple {
        /// Zero-based index of the offending triple.
        index: usize,
        /// The triple's tags in arrival order.
        transcript: String,
    },
}

/// How worker start times are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ArrivalPlan {
    /// Every worker sleeps a seeded-random delay in `[0, max_jitter)`.
    Jittered,
    /// All oxygen workers start ahead of any hydrogen.
    OxygenFirst,
    /// All hydrogen workers start ahead of any oxygen.
    HydrogenFirst,
    /// Arrivals approximate a strict H, H, O repetition.
    Alternating,
}

/// Configuration for an assembly run.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Number of molecules to assemble (`k`); spawns `2k` H and `k` O workers.
    pub molecules: usize,
    /// Seed for the jitter schedule.
    pub seed: u64,
    /// Upper bound (exclusive) on per-worker start jitter.
    pub max_jitter: Duration,
    /// Worker start-time schedule.
    pub arrival: ArrivalPlan,
}

impl AssemblyConfig {
    /// Creates a configuration for `molecules` molecules with jittered
    /// arrivals, seed 42 and up to 100 ms of start jitter.
    #[must_use]
    pub const fn new(molecules: usize) -> Self {
        Self {
            molecules,
            seed: 42,
            max_jitter: Duration::from_millis(100),
            arrival: ArrivalPlan::Jittered,
        }
    }

    /// Sets the jitter seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the upper bound on per-worker start jitter.
    #[must_use]
    pub const fn max_jitter(mut self, max: Duration) -> Self {
        self.max_jitter = max;
        self
    }

    /// Sets the arrival plan.
    #[must_use]
    pub const fn arrival(mut self, plan: ArrivalPlan) -> Self {
        self.arrival = plan;
        self
    }

    /// Number of hydrogen workers this configuration spawns.
    #[must_use]
    pub const fn hydrogen_workers(&self) -> usize {
        self.molecules * HYDROGEN_PER_MOLECULE
    }

    /// Number of oxygen workers this configuration spawns.
    #[must_use]
    pub const fn oxygen_workers(&self) -> usize {
        self.molecules * OXYGEN_PER_MOLECULE
    }

    /// Total workers spawned; also the emission log capacity.
    #[must_use]
    pub const fn total_workers(&self) -> usize {
        self.molecules * ATOMS_PER_MOLECULE
    }

    /// Creates a deterministic RNG from this configuration.
    #[must_use]
    pub fn rng(&self) -> Xorshift64 {
        Xorshift64::new(self.seed)
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Bounded, ordered, thread-safe collector of emissions.
///
/// Capacity is fixed at construction; recording past it is an implementation
/// bug upstream (more emissions than admitted workers) and panics.
#[derive(Debug)]
pub struct EmissionLog {
    entries: StdMutex<Vec<Element>>,
    capacity: usize,
}

impl EmissionLog {
    /// Creates an empty log holding at most `capacity` emissions.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: StdMutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends one emission in arrival order.
    ///
    /// # Panics
    /// Panics if the log is already full.
    pub fn record(&self, element: Element) {
        let mut entries = self.entries.lock().expect("emission log lock poisoned");
        assert!(
            entries.len() < self.capacity,
            "emission log overflow: capacity {}",
            self.capacity
        );
        entries.push(element);
    }

    /// Number of emissions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("emission log lock poisoned").len()
    }

    /// True if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the emissions recorded so far, in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Element> {
        self.entries
            .lock()
            .expect("emission log lock poisoned")
            .clone()
    }

    /// Consumes the log, yielding the emissions in arrival order.
    #[must_use]
    pub fn into_emissions(self) -> Vec<Element> {
        self.entries
            .into_inner()
            .expect("emission log lock poisoned")
    }
}

/// Summary of a successfully validated transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ValidationSummary {
    /// Number of complete triples.
    pub triples: usize,
    /// Total hydrogen emissions.
    pub hydrogens: usize,
    /// Total oxygen emissions.
    pub oxygens: usize,
}

/// Result of one assembly run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AssemblyReport {
    /// The `k` this run was configured for.
    pub molecules_requested: usize,
    /// Seed the jitter schedule was derived from.
    pub seed: u64,
    /// Arrival plan the run used.
    pub arrival: ArrivalPlan,
    /// Workers spawned (`3k`).
    pub workers_spawned: usize,
    /// Emissions recorded in the log.
    pub emissions_recorded: usize,
    /// Distinct completed generations observed in receipts.
    pub molecules_assembled: usize,
    /// Receipts reporting a tripped rendezvous.
    pub trip_leaders: usize,
    /// Workers whose bond call was cancelled.
    pub bonds_cancelled: usize,
    /// Wall-clock duration of the run.
    pub elapsed_ms: u64,
    /// Transcript validation, present only for uncancelled runs.
    pub validation: Option<ValidationSummary>,
}

/// Splits `emissions` into arrival-order triples and checks each holds
/// exactly two hydrogen and one oxygen. Order within a triple is free.
///
/// # Errors
///
/// Returns [`ValidationError::RaggedTranscript`] if the length is not a
/// multiple of three, or [`ValidationError::MalformedTriple`] naming the
/// first triple with a wrong multiset.
pub fn validate_emissions(emissions: &[Element]) -> Result<ValidationSummary, ValidationError> {
    if emissions.len() % ATOMS_PER_MOLECULE != 0 {
        return Err(ValidationError::RaggedTranscript {
            count: emissions.len(),
        });
    }

    let mut hydrogens = 0;
    let mut oxygens = 0;
    for (index, triple) in emissions.chunks_exact(ATOMS_PER_MOLECULE).enumerate() {
        let h = triple.iter().filter(|&&e| e == Element::Hydrogen).count();
        if h != HYDROGEN_PER_MOLECULE {
            return Err(ValidationError::MalformedTriple {
                index,
                transcript: triple.iter().map(|e| e.tag()).collect(),
            });
        }
        hydrogens += h;
        oxygens += ATOMS_PER_MOLECULE - h;
    }

    Ok(ValidationSummary {
        triples: emissions.len() / ATOMS_PER_MOLECULE,
        hydrogens,
        oxygens,
    })
}

/// Runs one full assembly: spawns `2k` hydrogen and `k` oxygen workers per
/// `config`, joins them, and reports what happened.
///
/// Workers sleep their planned start delay, then call their bond operation
/// with a callback recording into the shared log. For uncancelled runs the
/// transcript is validated and the receipts are cross-checked; a cancelled
/// run (any worker saw `cx` cancelled) skips transcript validation because
/// emissions of cancelled workers legitimately leave partial triples.
///
/// # Errors
///
/// Returns [`AssemblyError::WorkerPanicked`] if any worker thread panicked,
/// or [`AssemblyError::Validation`] if an uncancelled run produced an
/// invalid transcript.
///
/// # Panics
///
/// Panics if the receipts of an uncancelled run do not form exact molecule
/// groups; that is an implementation bug, not an input condition.
pub fn run_assembly(cx: &Cx, config: &AssemblyConfig) -> Result<AssemblyReport, AssemblyError> {
    let start = Instant::now();
    info!(
        molecules = config.molecules,
        seed = config.seed,
        plan = ?config.arrival,
        "assembly starting"
    );

    let synchronizer = Arc::new(MoleculeSynchronizer::new());
    let log = Arc::new(EmissionLog::with_capacity(config.total_workers()));
    let (hydrogen_delays, oxygen_delays) = start_delays(config);

    let mut workers: Vec<(Element, JoinHandle<Result<BondReceipt, BondError>>)> =
        Vec::with_capacity(config.total_workers());
    for delay in hydrogen_delays {
        let synchronizer = Arc::clone(&synchronizer);
        let log = Arc::clone(&log);
        let cx = cx.clone();
        workers.push((
            Element::Hydrogen,
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                synchronizer.bond_hydrogen(&cx, || log.record(Element::Hydrogen))
            }),
        ));
    }
    for delay in oxygen_delays {
        let synchronizer = Arc::clone(&synchronizer);
        let log = Arc::clone(&log);
        let cx = cx.clone();
        workers.push((
            Element::Oxygen,
            std::thread::spawn(move || {
                std::thread::sleep(delay);
                synchronizer.bond_oxygen(&cx, || log.record(Element::Oxygen))
            }),
        ));
    }
    debug!(
        hydrogen = config.hydrogen_workers(),
        oxygen = config.oxygen_workers(),
        "workers spawned"
    );

    let mut receipts = Vec::with_capacity(config.total_workers());
    let mut bonds_cancelled = 0;
    for (element, handle) in workers {
        match handle.join() {
            Ok(Ok(receipt)) => receipts.push(receipt),
            Ok(Err(BondError::Cancelled)) => bonds_cancelled += 1,
            Err(_) => return Err(AssemblyError::WorkerPanicked { element }),
        }
    }

    let trip_leaders = receipts.iter().filter(|r| r.led_trip).count();
    let molecules_assembled = receipts
        .iter()
        .map(|r| r.generation)
        .collect::<HashSet<_>>()
        .len();

    let validation = if bonds_cancelled == 0 {
        crosscheck_receipts(&receipts);
        Some(validate_emissions(&log.snapshot())?)
    } else {
        debug!(bonds_cancelled, "transcript validation skipped: run was cancelled");
        None
    };

    let report = AssemblyReport {
        molecules_requested: config.molecules,
        seed: config.seed,
        arrival: config.arrival,
        workers_spawned: config.total_workers(),
        emissions_recorded: log.len(),
        molecules_assembled,
        trip_leaders,
        bonds_cancelled,
        elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        validation,
    };
    info!(
        molecules = report.molecules_assembled,
        emissions = report.emissions_recorded,
        cancelled = report.bonds_cancelled,
        elapsed_ms = report.elapsed_ms,
        "assembly finished"
    );
    Ok(report)
}

/// Per-worker start delays for both pools, per the configured plan.
fn start_delays(config: &AssemblyConfig) -> (Vec<Duration>, Vec<Duration>) {
    let hydrogen = config.hydrogen_workers();
    let oxygen = config.oxygen_workers();
    match config.arrival {
        ArrivalPlan::Jittered => {
            let mut rng = config.rng();
            (
                (0..hydrogen)
                    .map(|_| rng.jitter_within(config.max_jitter))
                    .collect(),
                (0..oxygen)
                    .map(|_| rng.jitter_within(config.max_jitter))
                    .collect(),
            )
        }
        ArrivalPlan::OxygenFirst => (vec![PHASE_OFFSET; hydrogen], vec![Duration::ZERO; oxygen]),
        ArrivalPlan::HydrogenFirst => (vec![Duration::ZERO; hydrogen], vec![PHASE_OFFSET; oxygen]),
        ArrivalPlan::Alternating => {
            // Arrival sequence H, H, O, H, H, O, ... one step apart.
            let hydrogen = (0..hydrogen)
                .map(|i| {
                    let position = (i / HYDROGEN_PER_MOLECULE) * ATOMS_PER_MOLECULE
                        + i % HYDROGEN_PER_MOLECULE;
                    ALTERNATION_STEP * u32::try_from(position).unwrap_or(u32::MAX)
                })
                .collect();
            let oxygen = (0..oxygen)
                .map(|m| {
                    let position = m * ATOMS_PER_MOLECULE + HYDROGEN_PER_MOLECULE;
                    ALTERNATION_STEP * u32::try_from(position).unwrap_or(u32::MAX)
                })
                .collect();
            (hydrogen, oxygen)
        }
    }
}

/// Groups receipts by generation and asserts exact molecule composition:
/// three receipts per generation, two hydrogen, one oxygen, one leader.
fn crosscheck_receipts(receipts: &[BondReceipt]) {
    let mut groups: HashMap<u64, Vec<BondReceipt>> = HashMap::new();
    for receipt in receipts {
        groups.entry(receipt.generation).or_default().push(*receipt);
    }
    for (generation, group) in &groups {
        let hydrogens = group
            .iter()
            .filter(|r| r.element == Element::Hydrogen)
            .count();
        let leaders = group.iter().filter(|r| r.led_trip).count();
        assert!(
            group.len() == ATOMS_PER_MOLECULE,
            "molecule {generation} holds {} receipts",
            group.len()
        );
        assert!(
            hydrogens == HYDROGEN_PER_MOLECULE,
            "molecule {generation} holds {hydrogens} hydrogen receipts"
        );
        assert!(
            leaders == 1,
            "molecule {generation} has {leaders} trip leaders"
        );
    }
}
