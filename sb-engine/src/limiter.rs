//! # Token-Bucket Rate Limiter
//!
//! Purpose: Cap a worker's request rate without busy-spinning. The bucket
//! holds at most one second of burst; a drained bucket makes the loop sleep
//! for exactly the shortfall.
//!
//! When a ramp-up window is configured the effective rate climbs linearly
//! from zero to the target over the window.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Delay cap while the ramp is still climbing, so the effective rate is
/// re-evaluated as it grows.
const RAMP_POLL: Duration = Duration::from_millis(100);

/// Fractional token bucket, one token per admitted request.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    capacity: f64,
    tokens: f64,
    last_refill: Instant,
    ramp_up: Duration,
    epoch: Instant,
}

impl TokenBucket {
    /// Bucket admitting `rate` requests per second. It starts empty and
    /// banks at most one second of burst across idle stretches, so the
    /// long-run admission count stays within `rate` per elapsed second.
    pub fn new(rate: u32, ramp_up: Duration) -> Self {
        Self::new_at(rate, ramp_up, Instant::now())
    }

    pub fn new_at(rate: u32, ramp_up: Duration, now: Instant) -> Self {
        let rate = rate as f64;
        TokenBucket {
            rate,
            capacity: rate,
            tokens: 0.0,
            last_refill: now,
            ramp_up,
            epoch: now,
        }
    }

    /// Takes one token if available, refilling first.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Sleep needed until one token is available at the current rate.
    pub fn shortfall_at(&self, now: Instant) -> Duration {
        let rate = self.effective_rate(now);
        if rate <= f64::EPSILON {
            return RAMP_POLL;
        }
        let wait = Duration::from_secs_f64((1.0 - self.tokens).max(0.0) / rate);
        if self.ramping(now) { wait.min(RAMP_POLL) } else { wait }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.effective_rate(now))
            .min(self.capacity);
    }

    fn ramping(&self, now: Instant) -> bool {
        !self.ramp_up.is_zero() && now.saturating_duration_since(self.epoch) < self.ramp_up
    }

    fn effective_rate(&self, now: Instant) -> f64 {
        if !self.ramping(now) {
            return self.rate;
        }
        let progress = now.saturating_duration_since(self.epoch).as_secs_f64()
            / self.ramp_up.as_secs_f64();
        self.rate * progress
    }
}

/// Suspends until a token is spent. Holds no borrow across the sleep, so
/// every loop task of a worker can share one bucket.
pub async fn acquire(bucket: &RefCell<TokenBucket>) {
    loop {
        let wait = {
            let mut bucket = bucket.borrow_mut();
            let now = Instant::now();
            if bucket.try_acquire_at(now) {
                return;
            }
            bucket.shortfall_at(now)
        };
        sleep(wait).await;
    }
}
