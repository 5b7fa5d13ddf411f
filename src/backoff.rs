//! Backoff delay computation for reconnection attempts.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectionConfig;

/// Computes the delay before a reconnection attempt.
///
/// Delays grow exponentially with the attempt number, are capped at a maximum,
/// and carry a uniform jitter so a fleet of clients does not retry in lockstep.
/// Pure apart from the jitter randomness.
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    multiplier: f64,
    jitter_factor: f64,
    max_delay: Duration,
}

impl BackoffCalculator {
    /// Creates a calculator from raw policy values.
    pub fn new(multiplier: f64, jitter_factor: f64, max_delay: Duration) -> Self {
        Self {
            multiplier,
            jitter_factor,
            max_delay,
        }
    }

    /// Creates a calculator from a [`ReconnectionConfig`].
    pub fn from_config(config: &ReconnectionConfig) -> Self {
        Self::new(
            config.backoff_multiplier,
            config.jitter_factor,
            config.max_delay,
        )
    }

    /// Returns the delay for the given attempt.
    ///
    /// `attempt` is 1-based: attempt 1 yields `base_delay` (modulo jitter).
    /// The result is always within `[0, max_delay]` regardless of attempt growth.
    pub fn delay_for_attempt(&self, attempt: u32, base_delay: Duration) -> Duration {
        let max = self.max_delay.as_millis() as f64;
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = (base_delay.as_millis() as f64 * self.multiplier.powi(exponent)).min(max);

        let spread = raw * self.jitter_factor;
        let jittered = if spread > 0.0 {
            raw + rand::rng().random_range(-spread..=spread)
        } else {
            raw
        };

        Duration::from_millis(jittered.round().clamp(0.0, max) as u64)
    }
}
