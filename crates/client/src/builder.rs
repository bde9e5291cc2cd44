//! Builder pattern for constructing a [`Session`].

use std::sync::Arc;
use std::time::Duration;

use crate::config::SessionConfig;
use crate::connectivity::Connectivity;
use crate::reconnect::ReconnectBackoff;
use crate::session::Session;
use crate::transport::{Connector, WsConnector};
use crate::types::{Callbacks, DisconnectReason, SessionError, SessionHandler};

/// Fluent builder for [`Session`].
///
/// # Example
///
/// ```rust,no_run
/// # use rws_client::SessionBuilder;
/// # async fn demo() -> Result<(), rws_client::SessionError> {
/// let session = SessionBuilder::new("wss://example.com/ws")
///     .heartbeat_idle(std::time::Duration::from_secs(10))
///     .on_connect(|| println!("connected"))
///     .on_message(|payload| println!("<- {payload}"))
///     .on_disconnect(|reason, _| eprintln!("disconnected: {reason}"))
///     .connect()?;
/// session.send(r#"["hello"]"#);
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    url: String,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    connectivity: Connectivity,
    handler: Option<Box<dyn SessionHandler>>,
    callbacks: Callbacks,
}

impl SessionBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: SessionConfig::default(),
            connector: Arc::new(WsConnector),
            connectivity: Connectivity::new(),
            handler: None,
            callbacks: Callbacks::default(),
        }
    }

    // ── Timing ───────────────────────────────────────────────────────

    /// Replace the whole configuration, e.g. one loaded from TOML.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Max wait for the transport to open (default 16s).
    pub fn open_timeout(mut self, d: Duration) -> Self {
        self.config.open_timeout_ms = millis(d);
        self
    }

    /// Max wait for the handshake frame after open (default 3s).
    pub fn handshake_timeout(mut self, d: Duration) -> Self {
        self.config.handshake_timeout_ms = millis(d);
        self
    }

    /// Idle period before a heartbeat is sent (default 10s).
    pub fn heartbeat_idle(mut self, d: Duration) -> Self {
        self.config.heartbeat_idle_ms = millis(d);
        self
    }

    /// Max wait for a reply after a heartbeat (default 3s).
    pub fn heartbeat_reply_timeout(mut self, d: Duration) -> Self {
        self.config.heartbeat_reply_timeout_ms = millis(d);
        self
    }

    pub fn reconnect_backoff(mut self, backoff: ReconnectBackoff) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Cap the number of queued sends; the oldest is dropped when full.
    pub fn max_pending(mut self, n: usize) -> Self {
        self.config.max_pending = Some(n);
        self
    }

    // ── Collaborators ────────────────────────────────────────────────

    /// Swap the transport (default: WebSocket via tokio-tungstenite).
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Arc::new(connector);
        self
    }

    /// Share a reachability handle with the application.
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    // ── Callbacks ────────────────────────────────────────────────────

    /// Use a [`SessionHandler`] implementation.  Takes precedence over the
    /// `on_*` closures.
    pub fn handler(mut self, handler: impl SessionHandler) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn on_connect(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.callbacks.on_connect = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl FnMut(String) + Send + 'static) -> Self {
        self.callbacks.on_message = Some(Box::new(f));
        self
    }

    pub fn on_disconnect(
        mut self,
        f: impl FnMut(DisconnectReason, Option<Duration>) + Send + 'static,
    ) -> Self {
        self.callbacks.on_disconnect = Some(Box::new(f));
        self
    }

    /// Validate the configuration and start the session.  Must be called
    /// from within a Tokio runtime.
    pub fn connect(self) -> Result<Session, SessionError> {
        if self.url.trim().is_empty() {
            return Err(SessionError::Config("url is required".into()));
        }
        self.config.validate()?;

        let handler = match self.handler {
            Some(handler) => handler,
            None => Box::new(self.callbacks),
        };

        Ok(Session::spawn(
            self.url,
            self.config,
            self.connector,
            self.connectivity,
            handler,
        ))
    }
}

/// Whole milliseconds, saturating for durations too large for the config.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
