//! Test utilities for aquasync.
//!
//! This module provides shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Cancellation context constructors
//! - Emission transcript helpers
//!
//! # Example
//! ```
//! use aquasync::test_utils::{init_test_logging, test_cx};
//!
//! init_test_logging();
//! let cx = test_cx();
//! assert!(!cx.is_cancel_requested());
//! ```

use crate::cx::{CancelReason, Cx};
use crate::molecule::Element;
use std::sync::Once;

static INIT_LOGGING: Once = Once::new();

/// Default seed used by test harness helpers.
pub const DEFAULT_TEST_SEED: u64 = 0xDEAD_BEEF;

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Create a fresh cancellation context for testing.
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

/// Render an element sequence as its tag transcript, e.g. `"HHOHOH"`.
#[must_use]
pub fn tags_of(elements: &[Element]) -> String {
    elements.iter().map(|e| e.tag()).collect()
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
