use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Exponential backoff: `base * multiplier^(attempt - 1)`, capped at `max_delay`.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
}

impl BackoffPolicy {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Delay before reconnect attempt `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.config.base_delay.as_secs_f64();
        let cap = self.config.max_delay.as_secs_f64();
        let scaled = base * self.config.multiplier.max(1.0).powi(exponent);
        Duration::from_secs_f64(scaled.min(cap))
    }

    /// Delay before attempt `attempt` with the configured jitter applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        let jitter = self.config.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return delay;
        }

        let factor = 1.0 + rand::thread_rng().gen_range(-jitter..=jitter);
        let jittered = (delay.as_secs_f64() * factor).min(self.config.max_delay.as_secs_f64());
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Whether attempt `attempt` exceeds the configured attempt budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.config
            .max_attempts
            .map(|max| attempt > max)
            .unwrap_or(false)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
