//! inlet: a single-connection TCP text intake server.
//!
//! Binds one port and serves one client at a time: whatever the client sends
//! before closing its side is decoded, trimmed, and logged here on the
//! foreground thread. Messages hop from the listener's worker thread over an
//! mpsc channel, preserving accept order.

use std::sync::mpsc;

use inlet::config::Config;
use inlet::Listener;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        bind = %config.listener.bind_address,
        port = config.listener.bind_port,
        "Starting inlet server"
    );

    let (tx, rx) = mpsc::channel();
    let mut listener = Listener::new(config.listener);
    listener.start(tx)?;

    // The iteration ends only if the worker dies and drops its sender.
    for message in rx {
        info!(bytes = message.len(), message = %message, "Received message");
    }

    listener.stop();
    Ok(())
}
