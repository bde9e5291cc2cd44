//! `rws-client`: a resilient, reconnecting WebSocket session.
//!
//! A [`Session`] keeps one logical connection to a server alive across
//! network drops, server restarts and idle links.  Callers send text
//! payloads at any time; anything sent while the link is down is queued
//! and delivered in order once the server has greeted the client again.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  send / close   ┌────────────────────────────────┐
//! │ Session      │ ──────────────► │ session task (one per session) │
//! │ (handle)     │                 │                                │
//! └──────────────┘                 │  state ─ timers ─ outbox       │
//!        ▲                         │     ▲        ▲                 │
//!        │ on_connect              │     │        │ connectivity    │
//!        │ on_message              │  transport   │ restored        │
//!        │ on_disconnect           │  events      │                 │
//!        └──────────────────────── │     │                          │
//!                                  └─────┼──────────────────────────┘
//!                                        │
//!                                  ┌─────┴──────┐
//!                                  │ Connector  │  WsConnector (default)
//!                                  └────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. Open the transport (16s limit, reason `connect-timeout`)
//! 2. Wait for the first control frame (3s limit, reason `stillborn`)
//!    - `["hi"]`: ready; flush queued sends
//!    - `["denied"]`: stop for good
//!    - `["bye"...]`: retry after 5-20s
//! 3. While ready, send `["ping"]` after 10s without inbound traffic and
//!    expect any frame within 3s (reason `pong-timeout`)
//! 4. On disconnect: retry after 300ms, growing 1.5x per attempt up to 5s
//!
//! The [`Commander`] layer adds request/response calls and push routing on
//! top of a session.

pub mod builder;
pub mod commander;
pub mod config;
pub mod connectivity;
mod outbox;
pub mod reconnect;
pub mod registry;
pub mod session;
mod timers;
pub mod transport;
pub mod types;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::SessionBuilder;
pub use commander::{CommandError, Commander};
pub use config::SessionConfig;
pub use connectivity::Connectivity;
pub use reconnect::{ReconnectBackoff, RetryPolicy};
pub use registry::{HandlerRegistry, PushHandler};
pub use session::Session;
pub use transport::{channel, Connector, TransportEvent, TransportHandle, TransportPeer, WsConnector};
pub use types::{DisconnectReason, SessionError, SessionEvent, SessionHandler};

// Re-export the wire vocabulary so callers never need rws-protocol directly.
pub use rws_protocol::{command as envelope, ControlFrame, BYE_PREFIX, DENIED, HI, PING, PONG};
