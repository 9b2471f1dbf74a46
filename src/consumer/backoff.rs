//! Reconnect backoff with jitter.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

/// Exponential backoff between reconnect attempts.
///
/// Unbounded by default - the consumer never permanently gives up without an
/// external shutdown signal. A retry cap can be set where an escape hatch is
/// wanted. Delays carry +-50% jitter so a fleet of consumers does not stampede
/// the broker after an outage.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: Option<u32>,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_retries: None,
            current_attempt: 0,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if let Some(max_retries) = self.max_retries {
            if self.current_attempt >= max_retries {
                return Err(MaxRetriesExceeded);
            }
        }

        let delay = self.next_delay();
        log::warn!(
            "⏳ Reconnect attempt {} in {:.1}s",
            self.current_attempt + 1,
            delay.as_secs_f64()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    /// Doubles per attempt up to the cap, then applies jitter.
    fn next_delay(&self) -> Duration {
        let exponential = self
            .initial_delay
            .saturating_mul(2_u32.saturating_pow(self.current_attempt));
        let capped = exponential.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.5..=1.5);
        capped.mul_f64(jitter)
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.current_attempt
    }
}
