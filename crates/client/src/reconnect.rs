//! Reconnect policies: capped exponential growth for failures, a long
//! jittered wait for polite server shutdowns.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Which backoff formula a disconnect uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// `prior ? min(max, prior * factor) : min`.
    Standard,
    /// `polite_base + random[0, polite_jitter)`, independent of history.
    Polite,
    /// No reconnect.
    Never,
}

/// Controls how the session reconnects after a connection drop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectBackoff {
    /// Delay before the first reconnect in a run of standard failures.
    #[serde(default = "d_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Cap on standard-policy delays.
    #[serde(default = "d_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied to the prior standard delay.
    #[serde(default = "d_factor")]
    pub factor: f64,
    /// Fixed part of a polite delay.
    #[serde(default = "d_polite_base_ms")]
    pub polite_base_ms: u64,
    /// Width of the random window added to `polite_base_ms`.
    #[serde(default = "d_polite_jitter_ms")]
    pub polite_jitter_ms: u64,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            min_delay_ms: d_min_delay_ms(),
            max_delay_ms: d_max_delay_ms(),
            factor: d_factor(),
            polite_base_ms: d_polite_base_ms(),
            polite_jitter_ms: d_polite_jitter_ms(),
        }
    }
}

fn d_min_delay_ms() -> u64 {
    300
}

fn d_max_delay_ms() -> u64 {
    5_000
}

fn d_factor() -> f64 {
    1.5
}

fn d_polite_base_ms() -> u64 {
    5_000
}

fn d_polite_jitter_ms() -> u64 {
    15_000
}

impl ReconnectBackoff {
    /// Delay before the next attempt, or `None` when the policy never retries.
    ///
    /// `prior` is the last delay produced by the *same* policy; the caller
    /// is responsible for discarding it after a successful handshake.
    pub fn next_delay(&self, policy: RetryPolicy, prior: Option<Duration>) -> Option<Duration> {
        match policy {
            RetryPolicy::Standard => Some(self.standard(prior)),
            RetryPolicy::Polite => Some(self.polite()),
            RetryPolicy::Never => None,
        }
    }

    fn standard(&self, prior: Option<Duration>) -> Duration {
        match prior {
            Some(prior) => {
                let max = Duration::from_millis(self.max_delay_ms);
                // Sub-millisecond precision so the run follows prior * factor.
                Duration::try_from_secs_f64(prior.as_secs_f64() * self.factor)
                    .unwrap_or(max)
                    .min(max)
            }
            None => Duration::from_millis(self.min_delay_ms),
        }
    }

    fn polite(&self) -> Duration {
        if self.polite_jitter_ms == 0 {
            return Duration::from_millis(self.polite_base_ms);
        }
        let jitter = rand::rng().random_range(0..self.polite_jitter_ms);
        Duration::from_millis(self.polite_base_ms + jitter)
    }
}
