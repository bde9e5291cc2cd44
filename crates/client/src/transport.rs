//! Transport seam between the session and the network.
//!
//! A [`Connector`] opens transports.  Each open yields a
//! [`TransportHandle`] owned by the session and a [`TransportPeer`] owned by
//! whatever drives the actual socket.  The peer reports lifecycle events;
//! the handle sends text frames.  Closing the handle drops its event
//! receiver first, so a transport that is being discarded can never deliver
//! another event to the session.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Events a transport reports to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

/// Opens transports.  Implementations must return immediately; the
/// connection outcome is reported later through the peer's events.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &str) -> TransportHandle;
}

/// Session side of a transport.
#[derive(Debug)]
pub struct TransportHandle {
    outbound: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Socket side of a transport.
#[derive(Debug)]
pub struct TransportPeer {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

/// Create a connected handle/peer pair.
pub fn channel() -> (TransportHandle, TransportPeer) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    (
        TransportHandle {
            outbound: outbound_tx,
            events: events_rx,
        },
        TransportPeer {
            events: events_tx,
            outbound: outbound_rx,
        },
    )
}

impl TransportHandle {
    /// Queue a text frame.  Hands the frame back if the peer is gone.
    pub(crate) fn send(&self, frame: String) -> Result<(), String> {
        self.outbound.send(frame).map_err(|e| e.0)
    }

    /// Next event.  A peer that vanished without reporting counts as closed.
    pub(crate) async fn next_event(&mut self) -> TransportEvent {
        self.events.recv().await.unwrap_or(TransportEvent::Closed)
    }

    /// Detach the event receiver, then release the outbound sender so the
    /// peer shuts the socket down.
    pub(crate) fn close(self) {
        let TransportHandle {
            outbound,
            mut events,
        } = self;
        events.close();
        drop(events);
        drop(outbound);
    }
}

impl TransportPeer {
    /// Whether the session has let go of this transport.
    pub fn is_detached(&self) -> bool {
        self.events.is_closed()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// WebSocket connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// [`Connector`] backed by tokio-tungstenite.  Each open spawns a task
/// that owns the socket for the lifetime of that transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &str) -> TransportHandle {
        let (handle, peer) = channel();
        tokio::spawn(run_ws(url.to_string(), peer));
        handle
    }
}

async fn run_ws(url: String, mut peer: TransportPeer) {
    let ws = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "websocket connect failed");
                let _ = peer.events.send(TransportEvent::Error(e.to_string()));
                let _ = peer.events.send(TransportEvent::Closed);
                return;
            }
        },
        // Session gave up on this attempt before it opened.
        _ = peer.events.closed() => return,
    };

    if peer.events.send(TransportEvent::Opened).is_err() {
        return;
    }

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            outbound = peer.outbound.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        let _ = peer.events.send(TransportEvent::Error(e.to_string()));
                        let _ = peer.events.send(TransportEvent::Closed);
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if peer.events.send(TransportEvent::Message(text)).is_err() {
                        let _ = sink.close().await;
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(?frame, "server closed websocket");
                    let _ = peer.events.send(TransportEvent::Closed);
                    break;
                }
                // Protocol-level ping/pong is answered by tungstenite;
                // binary frames are not part of the session protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = peer.events.send(TransportEvent::Error(e.to_string()));
                    let _ = peer.events.send(TransportEvent::Closed);
                    break;
                }
                None => {
                    let _ = peer.events.send(TransportEvent::Closed);
                    break;
                }
            },
        }
    }
}
