//! ---
//! omnii_section: "02-session-lifecycle"
//! omnii_subsection: "module"
//! omnii_type: "source"
//! omnii_scope: "code"
//! omnii_description: "Session lifecycle engine for the Omnii connector."
//! omnii_version: "v0.1.0"
//! omnii_owner: "tbd"
//! ---
use std::time::Duration;

use omnii_common::BackoffConfig;
use rand::Rng;

/// Exponential backoff expressed as explicit state.
///
/// The schedule is a pure function of the attempt counter, so tests assert
/// on it without sleeping; jitter enters only at the await point in
/// [`Backoff::wait`] to avoid thundering-herd reconnects.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            attempt: 0,
        }
    }

    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(config.initial_delay, config.max_delay)
    }

    /// Attempts consumed since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay scheduled for the given attempt number (0-based), capped at the
    /// configured ceiling.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let millis = self.initial.as_millis().min(u128::from(u64::MAX)) as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(millis.saturating_mul(factor)).min(self.max)
    }

    /// Consume an attempt and return its scheduled delay.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Sleep for the next scheduled delay with jitter applied.
    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        tokio::time::sleep(delay.mul_f64(jitter)).await;
    }
}
