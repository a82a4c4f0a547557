#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use aquasync::molecule::{
    BondReceipt, Element, ATOMS_PER_MOLECULE, HYDROGEN_PER_MOLECULE, OXYGEN_PER_MOLECULE,
};
use aquasync::{CancelReason, Cx};
use std::collections::HashMap;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed used by jittered test scenarios.
pub const DEFAULT_TEST_SEED: u64 = 0xDEAD_BEEF;

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Create a fresh, uncancelled context.
#[must_use]
pub fn test_cx() -> Cx {
    Cx::new()
}

/// Create a context that is already cancelled.
#[must_use]
pub fn cancelled_cx() -> Cx {
    let cx = Cx::new();
    cx.cancel(CancelReason::user("test cancellation"));
    cx
}

/// Render an emission slice as its element tags, e.g. `"HHO"`.
#[must_use]
pub fn tags_of(emissions: &[Element]) -> String {
    emissions.iter().map(|e| e.tag()).collect()
}

/// Oracle: the receipts of an uncancelled run must partition into exactly
/// `expected` molecules, each one generation holding two hydrogen receipts,
/// one oxygen receipt, and a single trip leader.
pub fn assert_receipts_form_molecules(receipts: &[BondReceipt], expected: usize) {
    let mut by_generation: HashMap<u64, Vec<&BondReceipt>> = HashMap::new();
    for receipt in receipts {
        by_generation
            .entry(receipt.generation)
            .or_default()
            .push(receipt);
    }

    assert_eq!(
        by_generation.len(),
        expected,
        "receipts span {} generations, expected {expected} molecules",
        by_generation.len()
    );

    for (generation, group) in &by_generation {
        let hydrogens = group
            .iter()
            .filter(|r| r.element == Element::Hydrogen)
            .count();
        let oxygens = group
            .iter()
            .filter(|r| r.element == Element::Oxygen)
            .count();
        let leaders = group.iter().filter(|r| r.led_trip).count();

        assert_eq!(
            group.len(),
            ATOMS_PER_MOLECULE,
            "generation {generation} has {} receipts",
            group.len()
        );
        assert_eq!(
            hydrogens, HYDROGEN_PER_MOLECULE,
            "generation {generation} has {hydrogens} hydrogen receipts"
        );
        assert_eq!(
            oxygens, OXYGEN_PER_MOLECULE,
            "generation {generation} has {oxygens} oxygen receipts"
        );
        assert_eq!(
            leaders, 1,
            "generation {generation} has {leaders} trip leaders"
        );
    }
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
