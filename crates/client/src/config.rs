use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectBackoff;
use crate::types::SessionError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Timeouts and limits for one session.  Immutable once the session
/// starts.  All durations are milliseconds so the struct maps 1:1 onto a
/// TOML table:
///
/// ```toml
/// open_timeout_ms = 16000
/// handshake_timeout_ms = 3000
/// heartbeat_idle_ms = 10000
/// heartbeat_reply_timeout_ms = 3000
///
/// [backoff]
/// min_delay_ms = 300
/// max_delay_ms = 5000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Max wait for the transport to open.
    #[serde(default = "d_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Max wait for the first control frame after the transport opens.
    #[serde(default = "d_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Idle period with no inbound frames before a heartbeat is sent.
    #[serde(default = "d_heartbeat_idle_ms")]
    pub heartbeat_idle_ms: u64,

    /// Max wait for any frame after a heartbeat.
    #[serde(default = "d_heartbeat_reply_timeout_ms")]
    pub heartbeat_reply_timeout_ms: u64,

    /// Delay between a connectivity-restored signal and the reconnect.
    #[serde(default = "d_connectivity_settle_ms")]
    pub connectivity_settle_ms: u64,

    /// Cap on queued sends while disconnected.  `None` keeps everything.
    #[serde(default)]
    pub max_pending: Option<usize>,

    #[serde(default)]
    pub backoff: ReconnectBackoff,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: d_open_timeout_ms(),
            handshake_timeout_ms: d_handshake_timeout_ms(),
            heartbeat_idle_ms: d_heartbeat_idle_ms(),
            heartbeat_reply_timeout_ms: d_heartbeat_reply_timeout_ms(),
            connectivity_settle_ms: d_connectivity_settle_ms(),
            max_pending: None,
            backoff: ReconnectBackoff::default(),
        }
    }
}

fn d_open_timeout_ms() -> u64 {
    16_000
}

fn d_handshake_timeout_ms() -> u64 {
    3_000
}

fn d_heartbeat_idle_ms() -> u64 {
    10_000
}

fn d_heartbeat_reply_timeout_ms() -> u64 {
    3_000
}

fn d_connectivity_settle_ms() -> u64 {
    200
}

impl SessionConfig {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn heartbeat_idle(&self) -> Duration {
        Duration::from_millis(self.heartbeat_idle_ms)
    }

    pub fn heartbeat_reply_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_reply_timeout_ms)
    }

    pub fn connectivity_settle(&self) -> Duration {
        Duration::from_millis(self.connectivity_settle_ms)
    }

    /// Parse from TOML; missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, SessionError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject values that would make the state machine spin or stall.
    pub fn validate(&self) -> Result<(), SessionError> {
        let timeouts = [
            ("open_timeout_ms", self.open_timeout_ms),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
            ("heartbeat_idle_ms", self.heartbeat_idle_ms),
            ("heartbeat_reply_timeout_ms", self.heartbeat_reply_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, v)| *v == 0) {
            return Err(SessionError::Config(format!("{name} must be greater than zero")));
        }
        if self.max_pending == Some(0) {
            return Err(SessionError::Config(
                "max_pending must be greater than zero when set".into(),
            ));
        }

        let b = &self.backoff;
        if b.min_delay_ms == 0 {
            return Err(SessionError::Config(
                "backoff.min_delay_ms must be greater than zero".into(),
            ));
        }
        if b.min_delay_ms > b.max_delay_ms {
            return Err(SessionError::Config(format!(
                "backoff.min_delay_ms ({}) exceeds backoff.max_delay_ms ({})",
                b.min_delay_ms, b.max_delay_ms
            )));
        }
        if b.factor.is_nan() || b.factor < 1.0 {
            return Err(SessionError::Config(format!(
                "backoff.factor must be at least 1.0, got {}",
                b.factor
            )));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
