//! Capped exponential backoff with multiplicative jitter.
//!
//! `base(n) = min(cap, initial * 2^n)`, and each scheduled retry lands at
//! `now + floor(base(n) * U(0.8, 1.2))`. With the defaults that is roughly
//! 2s, 4s, 8s, ... up to one hour.

use std::time::Duration;

use rand::Rng;

pub const INITIAL_MS: u64 = 2_000;
pub const CAP_MS: u64 = 3_600_000;
pub const JITTER_MIN: f64 = 0.8;
pub const JITTER_MAX: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    initial_ms: u64,
    cap_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_ms: INITIAL_MS,
            cap_ms: CAP_MS,
        }
    }
}

impl BackoffPolicy {
    /// A cap below `initial` is raised to `initial`.
    pub fn new(initial: Duration, cap: Duration) -> Self {
        let initial_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        let cap_ms = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
        Self {
            initial_ms,
            cap_ms: cap_ms.max(initial_ms),
        }
    }

    pub fn initial_ms(&self) -> u64 {
        self.initial_ms
    }

    pub fn cap_ms(&self) -> u64 {
        self.cap_ms
    }

    /// Pre-jitter delay after `attempts` failures. Non-decreasing in `attempts`.
    pub fn base_ms(&self, attempts: u32) -> u64 {
        2u64.checked_pow(attempts)
            .and_then(|factor| self.initial_ms.checked_mul(factor))
            .map_or(self.cap_ms, |delay| delay.min(self.cap_ms))
    }

    /// Scale `base_ms` by a uniform factor in `[0.8, 1.2]`.
    pub fn jitter(&self, base_ms: u64) -> u64 {
        let factor = rand::rng().random_range(JITTER_MIN..=JITTER_MAX);
        (base_ms as f64 * factor).floor() as u64
    }

    /// The earliest time a flush pass may retry an entry with `attempts` failures.
    pub fn next_attempt(&self, now_ms: i64, attempts: u32) -> i64 {
        let delay = self.jitter(self.base_ms(attempts));
        now_ms.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX))
    }

    /// Upper bound of `next_attempt(now, attempts) - now`.
    pub fn max_delay_ms(&self, attempts: u32) -> u64 {
        (self.base_ms(attempts) as f64 * JITTER_MAX).floor() as u64
    }
}
