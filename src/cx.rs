//! Cancellation context for blocking operations.
//!
//! Cancellation in Aquasync is a first-class protocol, not a silent drop.
//! Every operation that can block — gate acquisition, barrier waits, whole
//! assembly runs — takes a [`Cx`] and observes cancellation at checkpoints.
//! A cancelled caller always returns with an error; it never leaves a permit
//! consumed or an arrival counted.
//!
//! # Usage
//!
//! ```
//! use aquasync::cx::{CancelReason, Cx};
//!
//! let cx = Cx::new();
//! assert!(cx.checkpoint().is_ok());
//!
//! cx.cancel(CancelReason::shutdown());
//! assert!(cx.checkpoint().is_err());
//! ```
//!
//! # Sharing
//!
//! `Cx` is cheaply clonable (it wraps an `Arc`); clones share the same
//! state, so a single `cancel` call is visible to every worker holding a
//! clone. This is how a harness aborts an entire run of blocked workers.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

/// The kind of cancellation request.
///
/// Kinds are ordered by [`severity`](Self::severity); a stronger kind
/// replaces a weaker stored reason when a context is cancelled twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Explicit cancellation requested by user code.
    User,
    /// Cancellation due to a timeout or deadline.
    Timeout,
    /// Cancellation due to process or harness shutdown.
    Shutdown,
}

impl CancelKind {
    /// Returns the severity of this cancellation kind.
    ///
    /// Higher severity reasons take precedence when strengthening.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Timeout => 1,
            Self::Shutdown => 2,
        }
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The reason for a cancellation, including kind and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional human-readable message (static for determinism).
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a new cancellation reason with the given kind.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// Creates a user cancellation reason with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Creates a timeout cancellation reason.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// Creates a shutdown cancellation reason.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Error returned by [`Cx::checkpoint`] once cancellation is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    reason: CancelReason,
}

impl Cancelled {
    /// Returns the reason the context was cancelled.
    #[must_use]
    pub fn reason(&self) -> &CancelReason {
        &self.reason
    }
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation cancelled ({})", self.reason)
    }
}

impl std::error::Error for Cancelled {}

#[derive(Debug, Default)]
struct CxInner {
    cancel_requested: AtomicBool,
    reason: StdMutex<Option<CancelReason>>,
}

/// A cancellation context shared between a controller and its workers.
///
/// Workers pass `&Cx` into blocking operations; the operations poll
/// [`checkpoint`](Self::checkpoint) while blocked and return a cancellation
/// error once it fires. The context carries no other authority — identity,
/// budgets and scheduling live with the caller.
#[derive(Debug, Clone, Default)]
pub struct Cx {
    inner: Arc<CxInner>,
}

impl Cx {
    /// Creates a fresh, uncancelled context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::Acquire)
    }

    /// Requests cancellation with the given reason.
    ///
    /// Idempotent: a second call only replaces the stored reason if its kind
    /// is strictly more severe. The reason is stored before the flag is
    /// published, so any observer of the flag can read a reason.
    pub fn cancel(&self, reason: CancelReason) {
        {
            let mut stored = self.inner.reason.lock().expect("cx reason lock poisoned");
            let stronger = match stored.as_ref() {
                Some(current) => reason.kind.severity() > current.kind.severity(),
                None => true,
            };
            if stronger {
                *stored = Some(reason);
            }
        }
        self.inner.cancel_requested.store(true, Ordering::Release);
    }

    /// Returns the stored cancellation reason, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.inner
            .reason
            .lock()
            .expect("cx reason lock poisoned")
            .clone()
    }

    /// Checks for cancellation, returning an error if it was requested.
    ///
    /// This is the checkpoint where blocked operations observe cancellation;
    /// it composes with `?`.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] carrying the cancellation reason once
    /// [`cancel`](Self::cancel) has been called.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if !self.is_cancel_requested() {
            return Ok(());
        }
        let reason = self
            .cancel_reason()
            .unwrap_or(CancelReason::new(CancelKind::User));
        Err(Cancelled { reason })
    }

    /// Emits a trace event attributed to this context.
    ///
    /// Compiles to a no-op unless the `tracing-integration` feature is
    /// enabled.
    pub fn trace(&self, message: &str) {
        #[cfg(feature = "tracing-integration")]
        tracing::trace!(target: "aquasync", "{message}");
        #[cfg(not(feature = "tracing-integration"))]
        let _ = message;
    }
}
