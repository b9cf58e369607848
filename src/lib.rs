//! inlet: a single-connection TCP text intake listener.
//!
//! Binds one TCP port and accepts one connection at a time on a background
//! worker thread. Everything a client sends until it closes its write side
//! is one message; the bytes are decoded as UTF-8 (invalid sequences
//! replaced), trimmed, and handed to a caller-supplied [`MessageSink`] in
//! accept order. Nothing is written back to the client.
//!
//! The worker waits for connections with a bounded poll, so [`Listener::stop`]
//! is observed within one accept-wait cycle and blocks until the worker has
//! fully exited and the port is released.
//!
//! ```no_run
//! use inlet::{Listener, ListenerConfig};
//! use std::sync::mpsc;
//!
//! let (tx, rx) = mpsc::channel();
//! let mut listener = Listener::new(ListenerConfig::default());
//! listener.start(tx)?;
//!
//! let message = rx.recv()?;
//! println!("received: {message}");
//!
//! listener.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod connection;
pub mod listener;
pub mod sink;

pub use config::{Config, ConfigError, ListenerConfig};
pub use connection::ReadError;
pub use listener::{Listener, ListenerState, StartError};
pub use sink::MessageSink;
