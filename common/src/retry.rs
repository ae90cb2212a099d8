// Backoff strategies for readiness probing
// Exponential growth with optional jitter, bounded by an attempt limit

use rand::Rng;
use std::time::Duration;

/// Backoff strategy trait for calculating delays between attempts
pub trait RetryStrategy: Send + Sync {
    /// Delay to wait after `attempt` (0-based) before the next one.
    /// Returns None once the attempt limit is reached
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Maximum number of attempts
    fn max_attempts(&self) -> u32;

    /// Check if another attempt is allowed
    fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts()
    }
}

/// Exponential backoff with jitter
/// Sequence with defaults: 250ms, 500ms, 1s, 2s, 2s, ...
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay: Duration,
    max_delay: Duration,
    /// Jitter factor (0.0 to 1.0)
    jitter_factor: f64,
    max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            jitter_factor: 0.1,
            max_attempts: 8,
        }
    }
}

impl ExponentialBackoff {
    /// Create a backoff strategy with custom values
    pub fn with_config(
        base_delay: Duration,
        max_delay: Duration,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_attempts,
        }
    }

    /// Exponential delay without jitter: base * 2^attempt, capped at max_delay
    fn calculate_base_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let jitter_range_ms = (delay.as_millis() as f64 * self.jitter_factor) as u64;
        if jitter_range_ms == 0 {
            return delay;
        }

        let jitter_ms = rand::thread_rng().gen_range(0..=jitter_range_ms);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        Some(self.add_jitter(self.calculate_base_delay(attempt)))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Fixed delay strategy (for testing or simple cases)
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: u32,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl RetryStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        Some(self.delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
