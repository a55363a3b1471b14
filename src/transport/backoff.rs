//! Exponential backoff with symmetric jitter for reconnection scheduling
//!
//! The delay saturates at `max_delay_ms` no matter how large the attempt
//! count grows; there is no cap on attempts themselves. A jitter factor of
//! zero produces the exact unjittered value, which keeps tests deterministic.

use crate::config::BackoffSection;
use rand::Rng;
use std::time::Duration;

/// Backoff parameters, immutable after construction
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound on the computed delay in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor applied per attempt
    pub multiplier: f64,
    /// Symmetric jitter fraction in [0, 1]
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&BackoffSection> for BackoffConfig {
    fn from(section: &BackoffSection) -> Self {
        Self {
            initial_delay_ms: section.initial_delay_ms,
            max_delay_ms: section.max_delay_ms,
            multiplier: section.multiplier,
            jitter_factor: section.jitter_factor,
        }
    }
}

/// Retry-delay policy owned by one messaging client instance.
///
/// `next_delay` both computes the wait and advances the attempt counter;
/// the client resets the counter on a successful connection.
#[derive(Debug)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Compute the next retry delay and advance the attempt counter.
    ///
    /// The first call (attempt 0) returns `initial_delay_ms` before jitter.
    pub fn next_delay(&mut self) -> Duration {
        let millis = self.unjittered_delay_ms();

        let millis = if self.config.jitter_factor > 0.0 {
            let jitter_span = millis * self.config.jitter_factor;
            let offset = rand::thread_rng().gen_range(-1.0..=1.0) * jitter_span;
            (millis + offset).max(0.0)
        } else {
            millis
        };

        self.attempt += 1;
        Duration::from_millis(millis.round() as u64)
    }

    /// Zero the attempt counter (issued on successful connect)
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Current attempt count
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// `min(initial * multiplier^attempt, max)` with saturation — the power
    /// overflows to infinity for very large attempts and the min() clamps it
    fn unjittered_delay_ms(&self) -> f64 {
        let raw = self.config.initial_delay_ms as f64 * self.config.multiplier.powf(self.attempt as f64);
        raw.min(self.config.max_delay_ms as f64)
    }
}
