//! Session wire protocol: reserved control frames and the command envelope.
//!
//! Every frame on the wire is a JSON array encoded as text.  A handful of
//! literal frames are reserved for the session layer itself:
//!
//! | Frame          | Direction        | Meaning                          |
//! |----------------|------------------|----------------------------------|
//! | `["hi"]`       | server → client  | handshake accepted               |
//! | `["denied"]`   | server → client  | handshake rejected (fatal)       |
//! | `["bye", ...]` | server → client  | graceful shutdown (prefix match) |
//! | `["ping"]`     | client → server  | heartbeat                        |
//! | `["pong"]`     | server → client  | heartbeat reply                  |
//!
//! Everything else is an application payload and passes through the
//! session untouched.  The optional [`command`] module defines one such
//! application envelope.

pub mod command;

/// Server → client: handshake accepted.
pub const HI: &str = r#"["hi"]"#;
/// Server → client: handshake rejected.
pub const DENIED: &str = r#"["denied"]"#;
/// Client → server: heartbeat.
pub const PING: &str = r#"["ping"]"#;
/// Server → client: heartbeat reply.
pub const PONG: &str = r#"["pong"]"#;
/// Prefix of every server shutdown notice; trailing fields are ignored.
pub const BYE_PREFIX: &str = r#"["bye""#;

/// A reserved control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFrame {
    Hi,
    Denied,
    Bye,
    Ping,
    Pong,
}

impl ControlFrame {
    /// Classify a text frame.  Matching is exact and case-sensitive for all
    /// frames except `bye`, which only needs the `["bye"` prefix.
    pub fn parse(frame: &str) -> Option<Self> {
        match frame {
            HI => Some(Self::Hi),
            DENIED => Some(Self::Denied),
            PING => Some(Self::Ping),
            PONG => Some(Self::Pong),
            f if f.starts_with(BYE_PREFIX) => Some(Self::Bye),
            _ => None,
        }
    }

    /// Canonical wire form.  `Bye` renders without a reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hi => HI,
            Self::Denied => DENIED,
            Self::Bye => r#"["bye"]"#,
            Self::Ping => PING,
            Self::Pong => PONG,
        }
    }
}

/// Build a shutdown notice carrying a human-readable reason,
/// e.g. `["bye","restarting"]`.
pub fn bye_with_reason(reason: &str) -> String {
    serde_json::json!(["bye", reason]).to_string()
}
