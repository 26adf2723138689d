//! Token-bucket rate limiting.

use std::sync::{Mutex, PoisonError};
use std::time::Instant;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket whose capacity equals its per-second rate.
///
/// `allow()` never blocks: it refills in proportion to the time elapsed
/// since the previous call, then spends a token if one is available.
/// A rate of zero disables limiting.
#[derive(Debug)]
pub struct RateLimiter {
    rate: u32,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(rate_per_second: u32) -> Self {
        Self {
            rate: rate_per_second,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(rate_per_second),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Configured rate in operations per second (0 = unlimited).
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Spends one token if available.
    pub fn allow(&self) -> bool {
        if self.rate == 0 {
            return true;
        }
        let capacity = f64::from(self.rate);
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * capacity).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently in the bucket, without refilling.
    pub fn available(&self) -> f64 {
        self.bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tokens
    }

    /// Restores full capacity immediately.
    pub fn reset(&self) {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.tokens = f64::from(self.rate);
        bucket.last_refill = Instant::now();
    }
}
