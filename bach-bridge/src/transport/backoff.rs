//! Reconnect delay schedule

use std::time::Duration;

use crate::config::ReconnectConfig;

/// Exponential backoff: `min(base * multiplier^(attempts-1), max)`.
///
/// Retries are unbounded; the attempt counter only resets on a successful
/// connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    attempts: u32,
}

impl Backoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            base: config.base_delay(),
            max: config.max_delay(),
            multiplier: config.multiplier,
            attempts: 0,
        }
    }

    /// Count one failed attempt and return how long to wait before the next
    pub fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        let exponent = (self.attempts - 1).min(i32::MAX as u32) as i32;
        let millis = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Called on every successful connect
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
