//! Shared harness: an in-memory [`Connector`] whose transports are driven
//! by the test, plus a session wired to a [`SessionEvent`] channel.
#![allow(dead_code)]

use std::time::Duration;

use rws_client::{
    channel, Connectivity, Connector, Session, SessionBuilder, SessionEvent, TransportEvent,
    TransportHandle, TransportPeer,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const URL: &str = "ws://mock.invalid/socket";

/// Connector that hands every opened transport's peer to the test.
pub struct MockConnector {
    opened: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { opened: tx }, rx)
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str) -> TransportHandle {
        let (handle, peer) = channel();
        let _ = self.opened.send(MockPeer {
            url: url.to_string(),
            peer,
        });
        handle
    }
}

/// The server side of one mock transport.
pub struct MockPeer {
    pub url: String,
    pub peer: TransportPeer,
}

impl MockPeer {
    pub fn open(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn push(&self, frame: &str) {
        self.emit(TransportEvent::Message(frame.to_string()));
    }

    pub fn error(&self, message: &str) {
        self.emit(TransportEvent::Error(message.to_string()));
    }

    pub fn close(&self) {
        self.emit(TransportEvent::Closed);
    }

    /// Open and complete the handshake.
    pub fn accept(&self) {
        self.open();
        self.push(rws_client::HI);
    }

    fn emit(&self, event: TransportEvent) {
        self.peer
            .events
            .send(event)
            .expect("session detached from this transport");
    }

    /// Next frame the session wrote, or `None` once the session let go.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.peer.outbound.recv().await
    }

    /// Frames written so far, without waiting.
    pub fn drain_sent(&mut self) -> Vec<String> {
        let mut sent = Vec::new();
        while let Ok(frame) = self.peer.outbound.try_recv() {
            sent.push(frame);
        }
        sent
    }

    pub fn is_detached(&self) -> bool {
        self.peer.is_detached()
    }
}

pub struct Harness {
    pub session: Session,
    pub peers: mpsc::UnboundedReceiver<MockPeer>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub connectivity: Connectivity,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(|b| b)
    }

    /// Start a session, letting the test adjust the builder first.
    pub fn start_with(configure: impl FnOnce(SessionBuilder) -> SessionBuilder) -> Self {
        Self::start_with_connectivity(Connectivity::new(), configure)
    }

    pub fn start_with_connectivity(
        connectivity: Connectivity,
        configure: impl FnOnce(SessionBuilder) -> SessionBuilder,
    ) -> Self {
        let (connector, peers) = MockConnector::new();
        let (events_tx, events) = mpsc::unbounded_channel();
        let builder = Session::builder(URL)
            .connector(connector)
            .connectivity(connectivity.clone())
            .handler(events_tx);
        let session = configure(builder).connect().expect("session starts");
        Self {
            session,
            peers,
            events,
            connectivity,
        }
    }

    pub async fn next_peer(&mut self) -> MockPeer {
        self.peers.recv().await.expect("connector dropped")
    }

    pub async fn next_event(&mut self) -> SessionEvent {
        self.events.recv().await.expect("session handler dropped")
    }

    /// Open a transport and complete the handshake on it.
    pub async fn ready_peer(&mut self) -> MockPeer {
        let peer = self.next_peer().await;
        peer.accept();
        assert_eq!(self.next_event().await, SessionEvent::Connected);
        peer
    }
}

pub fn disconnected(reason: rws_client::DisconnectReason, waited: Option<Duration>) -> SessionEvent {
    SessionEvent::Disconnected { reason, waited }
}

/// Assert that `expected` elapsed since `start`, allowing for timer-wheel
/// rounding.
pub fn assert_elapsed(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed <= expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {elapsed:?}"
    );
}

/// Let the session task run without moving the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
