// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! A pure policy object producing exponentially backed-off delays with jitter.

use rand::Rng;
use std::time::Duration;

/// Configuration for a [`Reconnector`].
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// The delay before the first retry.
    pub base_delay: Duration,
    /// The factor each subsequent delay is multiplied by.
    pub multiplier: f64,
    /// The ceiling no delay (pre-jitter) will exceed.
    pub max_delay: Duration,
    /// The maximum fraction of extra jitter added on top of a delay, in `[0, 1]`.
    pub max_jitter: f64,
    /// An optional cap on the number of attempts before giving up.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            max_jitter: 0.1,
            max_attempts: None,
        }
    }
}

/// Produces the sequence of delays `d_n = min(base * multiplier^(n-1), max) * (1 + U[0, jitter])`.
pub struct Reconnector {
    config: ReconnectConfig,
    attempt: u32,
}

impl Reconnector {
    /// Create a [`Reconnector`] from the given config.
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// The number of attempts made since the last [`Reconnector::reset`].
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether a reconnect cycle is currently in progress (i.e. at least one
    /// delay has been produced since the last reset).
    pub fn is_active(&self) -> bool {
        self.attempt > 0
    }

    /// Reset the attempt counter, as happens on a successful reconnect.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Produce the next delay, or `None` once `max_attempts` is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        self.attempt += 1;
        Some(self.delay_for_attempt(self.attempt))
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let raw = base * self.config.multiplier.powi(attempt as i32 - 1);
        let capped = raw.min(self.config.max_delay.as_secs_f64());

        let jitter = if self.config.max_jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.config.max_jitter)
        } else {
            0.0
        };

        Duration::from_secs_f64(capped * (1.0 + jitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_exponentially_within_bounds() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_jitter: 0.1,
            max_attempts: None,
        };
        let mut reconnector = Reconnector::new(config.clone());

        for n in 1..=6 {
            let delay = reconnector.next_delay().unwrap();
            let lower = config.base_delay.as_secs_f64() * config.multiplier.powi(n - 1);
            let lower = lower.min(config.max_delay.as_secs_f64());
            let upper = config.max_delay.as_secs_f64() * (1.0 + config.max_jitter);
            let secs = delay.as_secs_f64();
            assert!(secs >= lower - 1e-9, "attempt {n}: {secs} >= {lower}");
            assert!(secs <= upper + 1e-9, "attempt {n}: {secs} <= {upper}");
        }
        assert_eq!(reconnector.attempt(), 6);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let config = ReconnectConfig {
            max_attempts: Some(3),
            ..Default::default()
        };
        let mut reconnector = Reconnector::new(config);

        assert!(reconnector.next_delay().is_some());
        assert!(reconnector.next_delay().is_some());
        assert!(reconnector.next_delay().is_some());
        assert!(reconnector.next_delay().is_none());
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut reconnector = Reconnector::new(ReconnectConfig::default());
        reconnector.next_delay();
        reconnector.next_delay();
        assert_eq!(reconnector.attempt(), 2);
        reconnector.reset();
        assert_eq!(reconnector.attempt(), 0);
        assert!(!reconnector.is_active());
    }
}
