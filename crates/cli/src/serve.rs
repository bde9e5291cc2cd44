//! Reference server speaking the session protocol.
//!
//! Greets each connection with `["hi"]` (or `["denied"]`), answers
//! `["ping"]` with `["pong"]` and echoes every application frame.  On
//! shutdown, or after `bye_after_ms`, it says `["bye", reason]` and drops
//! the connection so clients back off politely.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rws_protocol::{bye_with_reason, ControlFrame, DENIED, HI, PONG};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::config::ServeConfig;

/// Bind `config.bind` and serve until `shutdown` fires.
pub async fn run(config: ServeConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("binding {}: {e}", config.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    serve(listener, config, shutdown).await;
    Ok(())
}

pub async fn serve(listener: TcpListener, config: ServeConfig, shutdown: CancellationToken) {
    let mut conns = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let config = config.clone();
                    let shutdown = shutdown.child_token();
                    conns.spawn(async move {
                        if let Err(e) = handle_conn(stream, peer, &config, shutdown).await {
                            tracing::debug!(peer = %peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
            Some(_) = conns.join_next(), if !conns.is_empty() => {}
            _ = shutdown.cancelled() => {
                tracing::info!(open = conns.len(), "server shutting down");
                break;
            }
        }
    }
    // Connections see the same cancellation and say bye before closing.
    while conns.join_next().await.is_some() {}
}

async fn handle_conn(
    stream: TcpStream,
    peer: SocketAddr,
    config: &ServeConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    if config.deny {
        tracing::info!(peer = %peer, "denying handshake");
        ws.send(Message::Text(DENIED.into())).await?;
        ws.close(None).await?;
        return Ok(());
    }

    tracing::info!(peer = %peer, "client connected");
    ws.send(Message::Text(HI.into())).await?;

    let bye_after = config.bye_after_ms.map(Duration::from_millis);
    let bye_timer = async move {
        match bye_after {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(bye_timer);

    let goodbye = loop {
        tokio::select! {
            inbound = ws.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = reply_for(&text) {
                        ws.send(Message::Text(reply)).await?;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(peer = %peer, "client disconnected");
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            () = &mut bye_timer => break "restarting",
            _ = shutdown.cancelled() => break "shutdown",
        }
    };

    tracing::info!(peer = %peer, reason = goodbye, "saying bye");
    ws.send(Message::Text(bye_with_reason(goodbye))).await?;
    ws.close(None).await?;
    Ok(())
}

/// What to answer to a client frame.  Heartbeats get a pong, application
/// frames are echoed, and stray control frames are dropped so the client
/// never sees its own `["bye"]` or `["hi"]` bounced back.
pub fn reply_for(frame: &str) -> Option<String> {
    match ControlFrame::parse(frame) {
        Some(ControlFrame::Ping) => Some(PONG.to_string()),
        Some(_) => None,
        None => Some(frame.to_string()),
    }
}
