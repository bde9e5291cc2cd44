//! Core types: disconnect reasons, session callbacks, and errors.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::reconnect::RetryPolicy;

/// Why a connection ended.  Rendered with the short strings used in logs
/// and handed to [`SessionHandler::on_disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The transport did not open within `open_timeout_ms`.
    ConnectTimeout,
    /// The transport opened but no handshake frame arrived in time.
    Stillborn,
    /// The server rejected the session with `["denied"]`.
    Denied,
    /// Transport-level error.
    Error,
    /// The transport closed after it had opened.
    TransportClosed,
    /// No frame arrived within the heartbeat-reply timeout.
    PongTimeout,
    /// The server announced a graceful shutdown with `["bye", ...]`.
    Bye,
    /// The caller closed the session.
    Close,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectTimeout => "connect-timeout",
            Self::Stillborn => "stillborn",
            Self::Denied => "denied",
            Self::Error => "error",
            Self::TransportClosed => "onclose",
            Self::PongTimeout => "pong-timeout",
            Self::Bye => "bye",
            Self::Close => "close",
        }
    }

    /// The backoff formula used after a disconnect for this reason.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            Self::Bye => RetryPolicy::Polite,
            Self::Close | Self::Denied => RetryPolicy::Never,
            Self::ConnectTimeout
            | Self::Stillborn
            | Self::Error
            | Self::TransportClosed
            | Self::PongTimeout => RetryPolicy::Standard,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives session lifecycle callbacks.
///
/// All methods run on the session task, one at a time, in the order the
/// underlying events happened.  Keep them short; hand heavy work off to
/// another task.
pub trait SessionHandler: Send + 'static {
    /// Handshake completed.  Fires once per successful connection.
    fn on_connect(&mut self) {}

    /// An application frame arrived.
    fn on_message(&mut self, _payload: String) {}

    /// The connection ended.  `waited` is the timeout that elapsed for
    /// timeout-driven reasons and `None` otherwise.  Not called for
    /// [`DisconnectReason::Close`].
    fn on_disconnect(&mut self, _reason: DisconnectReason, _waited: Option<Duration>) {}
}

/// Callback events as plain data, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Message(String),
    Disconnected {
        reason: DisconnectReason,
        waited: Option<Duration>,
    },
}

impl SessionHandler for mpsc::UnboundedSender<SessionEvent> {
    fn on_connect(&mut self) {
        let _ = self.send(SessionEvent::Connected);
    }

    fn on_message(&mut self, payload: String) {
        let _ = self.send(SessionEvent::Message(payload));
    }

    fn on_disconnect(&mut self, reason: DisconnectReason, waited: Option<Duration>) {
        let _ = self.send(SessionEvent::Disconnected { reason, waited });
    }
}

type ConnectFn = Box<dyn FnMut() + Send>;
type MessageFn = Box<dyn FnMut(String) + Send>;
type DisconnectFn = Box<dyn FnMut(DisconnectReason, Option<Duration>) + Send>;

/// Closure-backed handler assembled by the builder's `on_*` methods.
#[derive(Default)]
pub(crate) struct Callbacks {
    pub(crate) on_connect: Option<ConnectFn>,
    pub(crate) on_message: Option<MessageFn>,
    pub(crate) on_disconnect: Option<DisconnectFn>,
}

impl SessionHandler for Callbacks {
    fn on_connect(&mut self) {
        if let Some(f) = self.on_connect.as_mut() {
            f();
        }
    }

    fn on_message(&mut self, payload: String) {
        if let Some(f) = self.on_message.as_mut() {
            f(payload);
        }
    }

    fn on_disconnect(&mut self, reason: DisconnectReason, waited: Option<Duration>) {
        if let Some(f) = self.on_disconnect.as_mut() {
            f(reason, waited);
        }
    }
}

/// Top-level client error.  Connection churn is never reported here; only
/// construction and configuration problems are.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("config: {0}")]
    Config(String),
    #[error("config parse: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
