//! Session controller: owns the connection lifecycle, timers, outbox, and
//! the handshake/heartbeat sub-protocol.
//!
//! The controller runs as a single Tokio task.  Caller commands, transport
//! events, timer expiries and connectivity signals are handled one at a
//! time by [`Driver::run`], so no state is ever shared or locked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rws_protocol::{ControlFrame, PING};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::connectivity::{wait_restored, Connectivity};
use crate::outbox::Outbox;
use crate::reconnect::{ReconnectBackoff, RetryPolicy};
use crate::timers::{TimerAction, TimerKind, Timers};
use crate::transport::{Connector, TransportEvent, TransportHandle};
use crate::types::{DisconnectReason, SessionHandler};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Caller-facing handle to a running session.
///
/// Create via [`SessionBuilder`](crate::builder::SessionBuilder).  Dropping
/// the handle closes the session.
pub struct Session {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    closed: AtomicBool,
    task: JoinHandle<()>,
}

#[derive(Debug)]
enum Command {
    Send(String),
    Close,
}

impl Session {
    /// Start a new builder for `url`.
    pub fn builder(url: impl Into<String>) -> crate::builder::SessionBuilder {
        crate::builder::SessionBuilder::new(url)
    }

    pub(crate) fn spawn(
        url: String,
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        connectivity: Connectivity,
        handler: Box<dyn SessionHandler>,
    ) -> Self {
        let id = Uuid::new_v4();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("session", session_id = %id, url = %url);

        let driver = Driver {
            online: connectivity.subscribe(),
            connectivity,
            backoff: config.backoff.clone(),
            outbox: Outbox::new(config.max_pending),
            url,
            config,
            connector,
            handler,
            commands: commands_rx,
            state: State::Closed,
            timers: Timers::new(),
            last_activity: Instant::now(),
            last_retry: None,
        };
        let task = tokio::spawn(driver.run().instrument(span));

        Self {
            id,
            commands: commands_tx,
            closed: AtomicBool::new(false),
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Send a payload.  Delivered immediately when connected, otherwise
    /// queued and flushed in order after the next handshake or heartbeat
    /// reply.  No-op once the session is closed.
    pub fn send(&self, payload: impl Into<String>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.commands.send(Command::Send(payload.into()));
    }

    /// Stop the session for good.  Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.commands.send(Command::Close);
    }

    /// Whether the session has stopped, either through [`close`](Self::close)
    /// or because the server denied it.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.task.is_finished()
    }

    /// Wait for the session task to finish.  Only returns after
    /// [`close`](Self::close) or a denied handshake.
    pub async fn join(self) {
        let Session { commands, task, .. } = self;
        // Keep the command channel open so joining does not itself close
        // the session.
        let _keep = commands;
        if let Err(e) = task.await {
            tracing::error!(error = %e, "session task failed");
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State machine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum State {
    /// Transport requested, waiting for it to open.
    Connecting { transport: TransportHandle },
    /// Transport open, waiting for the first control frame.
    AwaitingHandshake { transport: TransportHandle },
    /// Handshake done.
    Ready {
        transport: TransportHandle,
        connected_at: Instant,
    },
    /// No transport; a reconnect timer and/or the connectivity listener is
    /// pending.
    RetryWaiting,
    /// Terminal.
    Closed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Connecting { .. } => "connecting",
            Self::AwaitingHandshake { .. } => "awaiting_handshake",
            Self::Ready { .. } => "ready",
            Self::RetryWaiting => "retry_waiting",
            Self::Closed => "closed",
        }
    }

    fn transport_mut(&mut self) -> Option<&mut TransportHandle> {
        match self {
            Self::Connecting { transport }
            | Self::AwaitingHandshake { transport }
            | Self::Ready { transport, .. } => Some(transport),
            Self::RetryWaiting | Self::Closed => None,
        }
    }

    fn into_transport(self) -> Option<TransportHandle> {
        match self {
            Self::Connecting { transport }
            | Self::AwaitingHandshake { transport }
            | Self::Ready { transport, .. } => Some(transport),
            Self::RetryWaiting | Self::Closed => None,
        }
    }
}

/// Whether a proactive heartbeat is due before trusting the link with a
/// user send.
pub(crate) fn heartbeat_due(last_activity: Instant, now: Instant, idle: Duration) -> bool {
    now.saturating_duration_since(last_activity) > idle
}

struct Driver {
    url: String,
    config: SessionConfig,
    backoff: ReconnectBackoff,
    connector: Arc<dyn Connector>,
    connectivity: Connectivity,
    online: watch::Receiver<bool>,
    handler: Box<dyn SessionHandler>,
    commands: mpsc::UnboundedReceiver<Command>,
    state: State,
    timers: Timers,
    outbox: Outbox,
    last_activity: Instant,
    /// Last reconnect delay and the policy that produced it.
    last_retry: Option<(RetryPolicy, Duration)>,
}

impl Driver {
    async fn run(mut self) {
        self.connect();

        while !matches!(self.state, State::Closed) {
            let next_deadline = self.timers.next_deadline();
            let listening = matches!(self.state, State::RetryWaiting);

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Send(payload)) => self.send(payload),
                    // A dropped handle closes the session as well.
                    Some(Command::Close) | None => self.close(),
                },

                event = next_transport_event(&mut self.state) => {
                    self.on_transport_event(event);
                }

                () = sleep_until(next_deadline) => self.on_timer(),

                () = wait_restored(&mut self.online, listening) => {
                    self.on_connectivity_restored();
                }
            }
        }

        tracing::debug!("session task finished");
    }

    // ── Caller commands ──────────────────────────────────────────────

    fn send(&mut self, payload: String) {
        let in_flight = self.timers.is_armed(TimerKind::Disconnect);
        let payload = match &self.state {
            State::Ready { transport, .. } if !in_flight => match transport.send(payload) {
                Ok(()) => {
                    if heartbeat_due(self.last_activity, Instant::now(), self.config.heartbeat_idle())
                    {
                        self.ping();
                    }
                    return;
                }
                // Transport is going away; its close event follows.
                Err(payload) => payload,
            },
            State::Closed => return,
            _ => payload,
        };
        self.enqueue(payload);
    }

    fn close(&mut self) {
        if matches!(self.state, State::Closed) {
            return;
        }
        tracing::info!("closing session");
        self.disconnect(DisconnectReason::Close, None);
        self.outbox.clear();
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    fn connect(&mut self) {
        self.timers.clear();

        if !self.connectivity.is_online() {
            tracing::info!("offline, waiting for connectivity");
            self.enter_retry_waiting();
            return;
        }

        tracing::info!(url = %self.url, "connecting");
        let transport = self.connector.open(&self.url);
        let open_timeout = self.config.open_timeout();
        self.timers.arm(
            TimerAction::Disconnect {
                reason: DisconnectReason::ConnectTimeout,
                waited: open_timeout,
            },
            open_timeout,
        );
        self.state = State::Connecting { transport };
    }

    /// Tear down the current transport and either schedule a reconnect or
    /// stop for good, depending on `reason`.
    fn disconnect(&mut self, reason: DisconnectReason, waited: Option<Duration>) {
        let policy = reason.retry_policy();
        let prior = self
            .last_retry
            .filter(|(p, _)| *p == policy)
            .map(|(_, d)| d);
        let delay = self.backoff.next_delay(policy, prior);

        let previous = std::mem::replace(&mut self.state, State::Closed);
        let connected_for = match &previous {
            State::Ready { connected_at, .. } => Some(connected_at.elapsed()),
            _ => None,
        };
        tracing::info!(
            reason = %reason,
            state = previous.name(),
            pending = self.outbox.len(),
            connected_ms = connected_for.map(|d| d.as_millis() as u64),
            retry_ms = delay.map(|d| d.as_millis() as u64),
            "disconnected"
        );
        if let Some(transport) = previous.into_transport() {
            transport.close();
        }
        self.timers.clear();

        match delay {
            Some(delay) => {
                self.last_retry = Some((policy, delay));
                self.timers.arm(TimerAction::Reconnect, delay);
                self.enter_retry_waiting();
                self.handler.on_disconnect(reason, waited);
            }
            None => {
                if reason != DisconnectReason::Close {
                    self.handler.on_disconnect(reason, waited);
                }
            }
        }
    }

    fn enter_retry_waiting(&mut self) {
        // Only signals raised from now on should count.
        let _ = self.online.borrow_and_update();
        self.state = State::RetryWaiting;
    }

    fn on_connectivity_restored(&mut self) {
        let settle = self.config.connectivity_settle();
        tracing::info!(settle_ms = settle.as_millis() as u64, "connectivity restored");
        self.timers.clear();
        self.timers.arm(TimerAction::Reconnect, settle);
    }

    // ── Transport events ─────────────────────────────────────────────

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => self.on_opened(),
            TransportEvent::Message(text) => match self.state {
                State::AwaitingHandshake { .. } => self.on_handshake_frame(text),
                State::Ready { .. } => self.on_frame(text),
                _ => tracing::warn!(state = self.state.name(), "frame before open, dropping"),
            },
            TransportEvent::Error(error) => {
                tracing::warn!(error = %error, state = self.state.name(), "transport error");
                self.disconnect(DisconnectReason::Error, None);
            }
            TransportEvent::Closed => {
                let reason = match self.state {
                    State::Connecting { .. } => DisconnectReason::Error,
                    _ => DisconnectReason::TransportClosed,
                };
                self.disconnect(reason, None);
            }
        }
    }

    fn on_opened(&mut self) {
        if !matches!(self.state, State::Connecting { .. }) {
            tracing::warn!(state = self.state.name(), "unexpected open event, ignoring");
            return;
        }
        let State::Connecting { transport } = std::mem::replace(&mut self.state, State::Closed)
        else {
            return;
        };
        tracing::debug!("transport open, awaiting handshake");
        let handshake_timeout = self.config.handshake_timeout();
        self.timers.clear();
        self.timers.arm(
            TimerAction::Disconnect {
                reason: DisconnectReason::Stillborn,
                waited: handshake_timeout,
            },
            handshake_timeout,
        );
        self.state = State::AwaitingHandshake { transport };
    }

    fn on_handshake_frame(&mut self, text: String) {
        match ControlFrame::parse(&text) {
            Some(ControlFrame::Hi) => {
                let State::AwaitingHandshake { transport } =
                    std::mem::replace(&mut self.state, State::Closed)
                else {
                    return;
                };
                tracing::info!(pending = self.outbox.len(), "handshake accepted");
                self.state = State::Ready {
                    transport,
                    connected_at: Instant::now(),
                };
                self.last_retry = None;
                self.mark_activity();
                self.handler.on_connect();
                self.flush();
            }
            Some(ControlFrame::Denied) => {
                tracing::warn!("handshake denied");
                self.disconnect(DisconnectReason::Denied, None);
            }
            Some(ControlFrame::Bye) => {
                tracing::info!(frame = %text, "server shutting down during handshake");
                self.disconnect(DisconnectReason::Bye, None);
            }
            _ => {
                tracing::warn!("unexpected frame during handshake, relaying");
                self.handler.on_message(text);
            }
        }
    }

    fn on_frame(&mut self, text: String) {
        self.mark_activity();
        match ControlFrame::parse(&text) {
            Some(ControlFrame::Pong) => {
                tracing::trace!("received pong");
                self.flush();
            }
            Some(ControlFrame::Bye) => {
                tracing::info!(frame = %text, "server shutting down");
                self.disconnect(DisconnectReason::Bye, None);
            }
            _ => self.handler.on_message(text),
        }
    }

    /// Record inbound activity and restart the idle timer.  Also cancels a
    /// pending heartbeat-reply timeout: any frame proves the link is alive.
    fn mark_activity(&mut self) {
        self.last_activity = Instant::now();
        self.timers.cancel(TimerKind::Disconnect);
        self.timers.arm(TimerAction::Ping, self.config.heartbeat_idle());
    }

    // ── Timers & heartbeat ───────────────────────────────────────────

    fn on_timer(&mut self) {
        let Some(action) = self.timers.take_expired(Instant::now()) else {
            return;
        };
        match action {
            TimerAction::Reconnect => self.connect(),
            TimerAction::Disconnect { reason, waited } => self.disconnect(reason, Some(waited)),
            TimerAction::Ping => {
                if matches!(self.state, State::Ready { .. }) {
                    self.ping();
                }
            }
        }
    }

    fn ping(&mut self) {
        let State::Ready { transport, .. } = &self.state else {
            return;
        };
        tracing::debug!("sending ping");
        if transport.send(PING.to_string()).is_err() {
            // Transport is gone; its close event drives the disconnect.
            return;
        }
        self.last_activity = Instant::now();
        let reply_timeout = self.config.heartbeat_reply_timeout();
        self.timers.clear();
        self.timers.arm(
            TimerAction::Disconnect {
                reason: DisconnectReason::PongTimeout,
                waited: reply_timeout,
            },
            reply_timeout,
        );
    }

    // ── Outbox ───────────────────────────────────────────────────────

    fn enqueue(&mut self, payload: String) {
        if let Some(evicted) = self.outbox.push(payload) {
            tracing::warn!(
                age_ms = evicted.age().as_millis() as u64,
                cap = self.config.max_pending,
                "outbox full, dropped oldest payload"
            );
        }
    }

    fn flush(&mut self) {
        let State::Ready { transport, .. } = &self.state else {
            return;
        };
        if self.outbox.is_empty() {
            return;
        }
        tracing::debug!(pending = self.outbox.len(), "flushing outbox");
        while let Some(pending) = self.outbox.pop() {
            tracing::debug!(
                buffered_ms = pending.age().as_millis() as u64,
                "sending buffered payload"
            );
            let enqueued_at = pending.enqueued_at;
            if let Err(payload) = transport.send(pending.payload) {
                self.outbox.requeue_front(crate::outbox::Pending {
                    payload,
                    enqueued_at,
                });
                break;
            }
        }
    }
}

async fn next_transport_event(state: &mut State) -> TransportEvent {
    match state.transport_mut() {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_due_only_after_idle_elapsed() {
        let start = Instant::now();
        let idle = Duration::from_secs(10);
        assert!(!heartbeat_due(start, start, idle));
        assert!(!heartbeat_due(start, start + idle, idle));
        assert!(heartbeat_due(start, start + idle + Duration::from_millis(1), idle));
    }

    #[test]
    fn heartbeat_due_tolerates_clock_order() {
        let now = Instant::now();
        assert!(!heartbeat_due(now + Duration::from_secs(5), now, Duration::from_secs(1)));
    }

    #[test]
    fn transport_lives_only_in_connected_states() {
        let (handle, _peer) = crate::transport::channel();
        let mut state = State::AwaitingHandshake { transport: handle };
        assert!(state.transport_mut().is_some());
        assert!(state.into_transport().is_some());
        assert!(State::RetryWaiting.into_transport().is_none());
        assert!(State::Closed.into_transport().is_none());
    }
}
