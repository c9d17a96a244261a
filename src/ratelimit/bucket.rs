//! Integer token bucket.

use std::time::Instant;

/// A single client's rate-limit state.
///
/// Tokens are whole numbers. Each check refills by
/// `floor(elapsed_secs * refill_per_second)` and then restarts the refill
/// clock, so partial tokens are dropped rather than carried over.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    /// Maximum number of tokens
    capacity: u64,
    /// Tokens added per elapsed second
    refill_per_second: u64,
    /// Tokens currently available, always within `0..=capacity`
    tokens: u64,
    /// When tokens were last refilled
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: u64, refill_per_second: u64, now: Instant) -> Self {
        Self {
            capacity,
            refill_per_second,
            tokens: capacity,
            last_refill: now,
        }
    }

    /// Refill for the time elapsed since the last check, then take one token.
    ///
    /// Returns `true` if a token was available.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        // The refill clock never moves backwards.
        if now > self.last_refill {
            let elapsed = now - self.last_refill;
            self.last_refill = now;

            let refill = (elapsed.as_secs_f64() * self.refill_per_second as f64) as u64;
            self.tokens = self.tokens.saturating_add(refill).min(self.capacity);
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    /// Tokens currently available.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Maximum number of tokens.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
