//! Chat Relay - Entry Point
//!
//! Loads configuration, binds the TCP listener and runs the relay until
//! Ctrl-C.

use std::env;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chat_relay::{AppError, ChatRelay, RosterEntry, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let mut config = ServerConfig::load()?;

    // Bind address from command line overrides the config
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Chat relay listening on {}", config.bind_addr);

    let relay = ChatRelay::new(listener, config);
    tokio::spawn(log_roster(relay.router().registry().subscribe_status()));

    relay
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to install Ctrl-C handler: {}", e);
            }
        })
        .await;

    info!("Chat relay stopped");
    Ok(())
}

/// Server status display: log the roster every time it changes
async fn log_roster(mut status: watch::Receiver<Vec<RosterEntry>>) {
    while status.changed().await.is_ok() {
        let entries = status.borrow_and_update().clone();
        if entries.is_empty() {
            info!("No users connected");
            continue;
        }

        let users = entries
            .iter()
            .map(|e| format!("{} ({})", e.name, e.addr))
            .collect::<Vec<_>>()
            .join(", ");
        info!("Connected users [{}]: {}", entries.len(), users);
    }
}
