//! `rws`: command-line front end for resilient WebSocket sessions.
//!
//! Usage:
//!   rws serve --bind 127.0.0.1:8765
//!   rws connect ws://127.0.0.1:8765
//!
//! Env vars:
//!   RWS_CONFIG  path to the TOML config (default: rws.toml)
//!   RUST_LOG    log filter (default: info)

mod config;
mod connect;
mod serve;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Resilient WebSocket sessions: client and reference server.
#[derive(Debug, Parser)]
#[command(name = "rws", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a session, send stdin lines as payloads and print what arrives.
    Connect {
        /// Server URL, e.g. ws://127.0.0.1:8765.
        url: String,
        /// Cap on payloads queued while disconnected.
        #[arg(long)]
        max_pending: Option<usize>,
    },
    /// Run the reference server.
    Serve {
        /// Listen address (overrides `[serve] bind`).
        #[arg(long)]
        bind: Option<String>,
        /// Reject every handshake.
        #[arg(long)]
        deny: bool,
        /// Say bye and drop each connection after this many milliseconds.
        #[arg(long)]
        bye_after_ms: Option<u64>,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_cli_tracing();
    let (mut config, config_path) = config::load_config()?;

    match cli.command {
        Command::Connect { url, max_pending } => {
            if max_pending.is_some() {
                config.session.max_pending = max_pending;
                config.session.validate()?;
            }
            connect::run(url, config.session).await
        }
        Command::Serve {
            bind,
            deny,
            bye_after_ms,
        } => {
            if let Some(bind) = bind {
                config.serve.bind = bind;
            }
            config.serve.deny |= deny;
            if bye_after_ms.is_some() {
                config.serve.bye_after_ms = bye_after_ms;
            }

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("received SIGINT, shutting down");
                }
                signal.cancel();
            });
            serve::run(config.serve, shutdown).await
        }
        Command::Config(ConfigCommand::Validate) => {
            println!("{config_path}: ok");
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Compact stderr tracing so stdout stays free for payloads.
fn init_cli_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
