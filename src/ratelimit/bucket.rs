//! Continuous token bucket.

use tokio::time::Instant;

/// Refill rate and burst size shared by every bucket of a limiter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    /// Tokens added per second
    pub rate: f64,
    /// Maximum tokens a bucket can hold
    pub capacity: f64,
}

impl Quota {
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            capacity: f64::from(burst),
        }
    }
}

/// Token bucket state for a single key.
///
/// Refill is computed lazily from the time elapsed since the last check, so
/// there is no ticking and burst behaviour does not depend on how often the
/// bucket is consulted.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_used: Instant,
}

impl TokenBucket {
    /// A full bucket: a new key starts with its whole burst allowance.
    pub fn full(quota: Quota, now: Instant) -> Self {
        Self {
            tokens: quota.capacity,
            last_refill: now,
            last_used: now,
        }
    }

    /// Refill for the time elapsed up to `now`, then take one token if one is
    /// available.
    ///
    /// Returns `false` without debiting when fewer than one token remains.
    pub fn try_acquire(&mut self, quota: Quota, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * quota.rate).min(quota.capacity);
        self.last_refill = now;
        self.last_used = now;

        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }

    /// Tokens held as of the last check.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Whether the bucket has not been used since `cutoff`.
    pub fn is_idle(&self, cutoff: Instant) -> bool {
        self.last_used < cutoff
    }
}
