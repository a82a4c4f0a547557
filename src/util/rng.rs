//! Deterministic pseudo-random number generator.
//!
//! A simple xorshift64 PRNG with no external dependencies. Given the same
//! seed, the sequence is always identical, so any adversarial arrival
//! schedule the harness produces can be replayed exactly from its seed.

use std::time::Duration;

/// A deterministic pseudo-random number generator using xorshift64.
///
/// Intentionally simple and fast. NOT cryptographically secure.
#[derive(Debug, Clone)]
pub struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    /// Creates a new PRNG with the given seed.
    ///
    /// The seed must be non-zero. If zero is provided, it will be replaced
    /// with 1.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Generates the next pseudo-random u64 value.
    #[allow(clippy::missing_const_for_fn)] // Cannot be const: mutates self
    pub fn next_u64(&mut self) -> u64 {
        // xorshift64 algorithm
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Generates a pseudo-random delay in `[0, max)`, millisecond-granular.
    ///
    /// `max` of zero (or under a millisecond) yields no delay.
    pub fn jitter_within(&mut self, max: Duration) -> Duration {
        let bound = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if bound == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.next_u64() % bound)
    }
}
