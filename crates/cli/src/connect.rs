//! `rws connect`: an interactive session client.
//!
//! Each non-empty stdin line is sent as one payload; every received
//! application frame is printed to stdout.  Lifecycle changes go to the
//! log on stderr.  Ctrl-C closes the session.

use rws_client::{DisconnectReason, Session, SessionConfig, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub async fn run(url: String, config: SessionConfig) -> anyhow::Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let session = Session::builder(url).config(config).handler(tx).connect()?;
    tracing::info!(session_id = %session.id(), "session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => session.send(line),
                // Keep printing replies after the input runs out.
                None => stdin_open = false,
            },
            event = events.recv() => match event {
                Some(SessionEvent::Connected) => tracing::info!("connected"),
                Some(SessionEvent::Message(payload)) => println!("{payload}"),
                Some(SessionEvent::Disconnected { reason, waited }) => {
                    tracing::warn!(
                        reason = %reason,
                        waited_ms = waited.map(|d| d.as_millis() as u64),
                        "disconnected"
                    );
                    if reason == DisconnectReason::Denied {
                        anyhow::bail!("server denied the session");
                    }
                }
                None => break,
            },
            _ = &mut ctrl_c => {
                tracing::info!("received SIGINT, closing session");
                break;
            }
        }
    }

    session.close();
    session.join().await;
    Ok(())
}
