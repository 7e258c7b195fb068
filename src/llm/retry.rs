//! Exponential backoff with jitter for transport-only retries.
//!
//! The LLM Client retries transport failures (connection errors, timeouts,
//! 5xx) up to a fixed attempt count; it never retries on a well-formed
//! non-2xx application error such as a content filter rejection.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            max: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry attempt `attempt` (1-indexed), full jitter in
    /// `[0, min(max, base * 2^(attempt-1)))`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.as_millis().saturating_mul(1u128 << attempt.min(16));
        let capped = exp.min(self.max.as_millis());
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered as u64)
    }
}
