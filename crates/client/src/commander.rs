//! Request/response layer over a [`Session`].
//!
//! Outgoing commands are JSON arrays `[kind, callback_id?, ...args]`.  The
//! server answers a request with `[callback_id, ...results]` and pushes
//! unsolicited messages as `[kind, ...args]`, which are routed through a
//! [`HandlerRegistry`].  Because the session queues sends while
//! disconnected, a call made during an outage is delivered after the next
//! handshake and its response still resolves the waiting caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rws_protocol::command::{self, Envelope};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::builder::SessionBuilder;
use crate::reconnect::RetryPolicy;
use crate::registry::HandlerRegistry;
use crate::session::Session;
use crate::types::{DisconnectReason, SessionError, SessionHandler};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("session closed")]
    Closed,
    #[error("call abandoned before a response arrived")]
    Abandoned,
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

struct PendingCall {
    kind: String,
    sent_at: Instant,
    reply: oneshot::Sender<Vec<Value>>,
}

struct Shared {
    registry: HandlerRegistry,
    pending: Mutex<HashMap<u64, PendingCall>>,
    next_id: AtomicU64,
}

impl Shared {
    /// Drop every pending callback; their callers get
    /// [`CommandError::Abandoned`].
    fn abandon_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    fn dispatch(&self, payload: &str) {
        match command::decode(payload) {
            Ok(Envelope::Response { id, args }) => {
                let call = self.pending.lock().remove(&id);
                match call {
                    Some(call) => {
                        tracing::debug!(
                            id,
                            kind = %call.kind,
                            elapsed_ms = call.sent_at.elapsed().as_millis() as u64,
                            "command response"
                        );
                        let _ = call.reply.send(args);
                    }
                    None => tracing::debug!(id, "ignoring response with no pending call"),
                }
            }
            Ok(Envelope::Push { kind, args }) => match self.registry.get(&kind) {
                Some(handler) => {
                    tracing::debug!(kind = %kind, "server push");
                    handler.handle(args);
                }
                None => tracing::debug!(kind = %kind, "ignoring push with no handler"),
            },
            Err(e) => tracing::debug!(error = %e, "ignoring non-command frame"),
        }
    }
}

/// Session handler that feeds the command layer.
struct Router {
    shared: Arc<Shared>,
}

impl SessionHandler for Router {
    fn on_connect(&mut self) {
        self.shared.registry.connected();
    }

    fn on_message(&mut self, payload: String) {
        self.shared.dispatch(&payload);
    }

    fn on_disconnect(&mut self, reason: DisconnectReason, waited: Option<Duration>) {
        if reason.retry_policy() == RetryPolicy::Never {
            // No reconnect is coming, so no response can arrive.
            let abandoned = self.shared.abandon_all();
            if abandoned > 0 {
                tracing::info!(abandoned, reason = %reason, "session ended with calls outstanding");
            }
        }
        self.shared.registry.disconnected(reason, waited);
    }
}

/// A session speaking the command envelope.
pub struct Commander {
    session: Session,
    shared: Arc<Shared>,
}

impl Commander {
    /// Start a session from `builder`, routing its frames through
    /// `registry`.  Any handler or callbacks set on the builder are
    /// replaced.
    pub fn connect(builder: SessionBuilder, registry: HandlerRegistry) -> Result<Self, SessionError> {
        let shared = Arc::new(Shared {
            registry,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });
        let session = builder
            .handler(Router {
                shared: shared.clone(),
            })
            .connect()?;
        Ok(Self { session, shared })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fire-and-forget command.
    pub fn send(&self, kind: &str, args: &[Value]) {
        tracing::debug!(kind = %kind, "command send");
        self.session.send(command::encode(kind, None, args));
    }

    /// Send a command and wait for its response.
    pub async fn call(&self, kind: &str, args: &[Value]) -> Result<Vec<Value>, CommandError> {
        let (_id, rx) = self.start_call(kind, args)?;
        rx.await.map_err(|_| CommandError::Abandoned)
    }

    /// Like [`call`](Self::call) but gives up after `timeout`, forgetting
    /// the callback so a late response is ignored.
    pub async fn call_timeout(
        &self,
        kind: &str,
        args: &[Value],
        timeout: Duration,
    ) -> Result<Vec<Value>, CommandError> {
        let (id, rx) = self.start_call(kind, args)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(reply) => reply.map_err(|_| CommandError::Abandoned),
            Err(_) => {
                self.shared.pending.lock().remove(&id);
                Err(CommandError::Timeout(timeout))
            }
        }
    }

    fn start_call(
        &self,
        kind: &str,
        args: &[Value],
    ) -> Result<(u64, oneshot::Receiver<Vec<Value>>), CommandError> {
        if self.session.is_closed() {
            return Err(CommandError::Closed);
        }
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(
            id,
            PendingCall {
                kind: kind.to_string(),
                sent_at: Instant::now(),
                reply: tx,
            },
        );
        tracing::debug!(id, kind = %kind, "command call");
        self.session.send(command::encode(kind, Some(id), args));
        Ok((id, rx))
    }

    /// Number of calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Drop callbacks older than `older_than`.  Their callers get
    /// [`CommandError::Abandoned`].  Returns how many were dropped.
    pub fn prune_stale(&self, older_than: Duration) -> usize {
        let mut pending = self.shared.pending.lock();
        let before = pending.len();
        pending.retain(|_, call| call.sent_at.elapsed() < older_than);
        let pruned = before - pending.len();
        if pruned > 0 {
            tracing::info!(pruned, "pruned stale command callbacks");
        }
        pruned
    }

    /// Close the session and abandon every outstanding call.
    pub fn close(&self) {
        self.session.close();
        self.shared.abandon_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;

    fn shared(registry: HandlerRegistry) -> Shared {
        Shared {
            registry,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn pending_call(shared: &Shared, id: u64) -> oneshot::Receiver<Vec<Value>> {
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().insert(
            id,
            PendingCall {
                kind: "get".into(),
                sent_at: Instant::now(),
                reply: tx,
            },
        );
        rx
    }

    #[tokio::test]
    async fn response_resolves_matching_call() {
        let shared = shared(HandlerRegistry::new());
        let rx = pending_call(&shared, 4);

        shared.dispatch(r#"[4,{"kept":true}]"#);

        assert_eq!(rx.await.unwrap(), vec![json!({"kept": true})]);
        assert!(shared.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_response_id_is_ignored() {
        let shared = shared(HandlerRegistry::new());
        let _rx = pending_call(&shared, 1);
        shared.dispatch("[2]");
        assert_eq!(shared.pending.lock().len(), 1);
    }

    #[test]
    fn push_routes_to_registered_handler() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let shared = shared(HandlerRegistry::new().on("notification", move |args| {
            assert_eq!(args, vec![json!("hello")]);
            h.fetch_add(1, Ordering::SeqCst);
        }));

        shared.dispatch(r#"["notification","hello"]"#);
        shared.dispatch(r#"["other","ignored"]"#);
        shared.dispatch("not json at all");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
