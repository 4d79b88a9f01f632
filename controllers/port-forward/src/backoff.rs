//! # Fibonacci Backoff
//!
//! Progressive delays that grow more slowly than exponential backoff.
//! Used to stretch the reconciliation interval while passes keep failing and
//! to space out compensating deletes.
//!
//! Sequence for `new(1s, 10s)`: 1s, 1s, 2s, 3s, 5s, 8s, 10s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min` (used for the first two values) and capped at `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max: max.max(min),
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}
