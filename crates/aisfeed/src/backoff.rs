//! Reconnect delay: starts at the base delay, grows by the multiplier on
//! every close, capped at the max. Only a session that delivered feed data
//! may reset it, and only when configured to.

use std::time::Duration;

use crate::config::BackoffConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.base.min(config.max),
            config,
        }
    }

    /// Delay to wait before the next connect attempt. Advances the state.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let scaled = self.current.as_secs_f64() * self.config.multiplier;
        self.current = if scaled.is_finite() {
            Duration::from_secs_f64(scaled).min(self.config.max)
        } else {
            self.config.max
        };
        delay
    }

    /// Called once a session has delivered feed data.
    pub fn on_session_healthy(&mut self) {
        if self.config.reset_on_success {
            self.current = self.config.base.min(self.config.max);
        }
    }

    /// The delay the next call to `next_delay` will return.
    pub fn peek(&self) -> Duration {
        self.current
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
