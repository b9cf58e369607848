//! Accept loop and lifecycle for the intake listener.
//!
//! One worker thread owns the listening socket and serves one client at a
//! time. The worker waits for connections with a bounded poll so the stop
//! flag is observed within `accept_wait_timeout` even when no client ever
//! connects.

use crate::config::ListenerConfig;
use crate::connection;
use crate::sink::MessageSink;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LISTENER_TOKEN: Token = Token(0);

/// Lifecycle states of a [`Listener`].
///
/// `Stopped` is terminal: a new instance is created to listen again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Starting,
    Running,
    StopRequested,
    Stopped,
}

/// Errors surfaced by [`Listener::start`].
#[derive(Debug)]
pub enum StartError {
    /// Binding or registering the listening socket failed.
    Bind(io::Error),
    /// The listener was already started; the original worker is untouched.
    AlreadyStarted(ListenerState),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Bind(e) => write!(f, "failed to bind listener: {e}"),
            StartError::AlreadyStarted(state) => {
                write!(f, "listener already started (state {state:?})")
            }
        }
    }
}

impl std::error::Error for StartError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartError::Bind(e) => Some(e),
            StartError::AlreadyStarted(_) => None,
        }
    }
}

/// A single-port TCP listener delivering one message per connection.
///
/// `start` binds the socket and spawns the worker; `stop` signals the worker
/// and joins it. The listening socket exists only while the state is
/// `Running` or `StopRequested`, and at most one worker is alive per
/// instance.
pub struct Listener {
    config: ListenerConfig,
    state: ListenerState,
    run_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Listener {
    /// Create an idle listener; nothing is bound until [`start`](Self::start).
    pub fn new(config: ListenerConfig) -> Self {
        Self {
            config,
            state: ListenerState::Idle,
            run_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            local_addr: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Actual bound address while the listener is running.
    ///
    /// Needed when `bind_port` is 0 and the OS picked an ephemeral port.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the configured endpoint and spawn the worker thread.
    ///
    /// Returns as soon as the worker is running; messages are then delivered
    /// to `sink` until [`stop`](Self::stop). On bind failure the listener
    /// returns to `Idle` and no worker is spawned. Calling `start` on a
    /// listener that is not `Idle` is a misuse and reports
    /// [`StartError::AlreadyStarted`] without touching the running worker.
    pub fn start(&mut self, sink: impl MessageSink + 'static) -> Result<(), StartError> {
        if self.state != ListenerState::Idle {
            return Err(StartError::AlreadyStarted(self.state));
        }
        self.state = ListenerState::Starting;

        let (poll, tcp_listener, local_addr) = match bind_and_register(&self.config) {
            Ok(parts) => parts,
            Err(e) => {
                self.state = ListenerState::Idle;
                return Err(StartError::Bind(e));
            }
        };

        self.run_flag.store(true, Ordering::SeqCst);
        let run_flag = Arc::clone(&self.run_flag);
        let config = self.config.clone();
        let sink: Box<dyn MessageSink> = Box::new(sink);

        let worker = thread::Builder::new()
            .name("inlet-listener".to_string())
            .spawn(move || accept_loop(poll, tcp_listener, config, run_flag, sink));

        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                self.run_flag.store(false, Ordering::SeqCst);
                self.state = ListenerState::Idle;
                return Err(StartError::Bind(e));
            }
        };

        self.worker = Some(worker);
        self.local_addr = Some(local_addr);
        self.state = ListenerState::Running;
        info!(addr = %local_addr, "listener started");
        Ok(())
    }

    /// Signal the worker to stop and wait for it to exit.
    ///
    /// Blocks for up to `max(accept_wait_timeout, idle_read_timeout)` while
    /// the worker finishes its current wait or read. Idempotent; a no-op
    /// when the listener was never started or is already stopped. After it
    /// returns no further messages are delivered and the port is released.
    pub fn stop(&mut self) {
        if matches!(self.state, ListenerState::Idle | ListenerState::Stopped) {
            return;
        }
        self.state = ListenerState::StopRequested;
        self.run_flag.store(false, Ordering::SeqCst);

        // The worker drops the socket and the sink before it returns.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }

        self.local_addr = None;
        self.state = ListenerState::Stopped;
        info!("listener stopped");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the listening socket and register it for readiness polling.
fn bind_and_register(config: &ListenerConfig) -> io::Result<(Poll, TcpListener, SocketAddr)> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.bind_port)
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(config.accept_backlog.max(1) as i32)?;

    let std_listener: std::net::TcpListener = socket.into();
    let local_addr = std_listener.local_addr()?;
    let mut tcp_listener = TcpListener::from_std(std_listener);

    let poll = Poll::new()?;
    poll.registry()
        .register(&mut tcp_listener, LISTENER_TOKEN, Interest::READABLE)?;

    Ok((poll, tcp_listener, local_addr))
}

/// Worker loop: bounded wait, accept, read, dispatch, repeat.
fn accept_loop(
    mut poll: Poll,
    tcp_listener: TcpListener,
    config: ListenerConfig,
    run_flag: Arc<AtomicBool>,
    sink: Box<dyn MessageSink>,
) {
    let mut events = Events::with_capacity(4);

    while run_flag.load(Ordering::SeqCst) {
        match poll.poll(&mut events, Some(config.accept_wait_timeout)) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!(error = %e, "wait for connections failed, shutting down listener");
                break;
            }
        }

        if events.is_empty() {
            // Timed out with no connection; re-check the run flag.
            continue;
        }

        drain_pending(&tcp_listener, &config, &run_flag, sink.as_ref());
    }

    debug!("listener worker exiting");
}

/// Accept and serve every connection currently pending, one at a time.
///
/// The registration is edge-triggered, so accepts must be drained until the
/// listener reports `WouldBlock`.
fn drain_pending(
    tcp_listener: &TcpListener,
    config: &ListenerConfig,
    run_flag: &AtomicBool,
    sink: &dyn MessageSink,
) {
    while run_flag.load(Ordering::SeqCst) {
        match tcp_listener.accept() {
            Ok((stream, peer)) => serve_connection(stream, peer, config, sink),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                // A single failed accept is not fatal to the loop.
                warn!(error = %e, "accept failed");
                break;
            }
        }
    }
}

/// Read one message from an accepted connection and dispatch it.
///
/// The stream is dropped, and therefore closed, on every path out of this
/// function.
fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &ListenerConfig,
    sink: &dyn MessageSink,
) {
    debug!(peer = %peer, "connection accepted");

    if let Err(e) = configure_stream(&stream, config.idle_read_timeout) {
        warn!(peer = %peer, error = %e, "socket configuration failed");
        return;
    }

    match connection::read_message(&mut stream, config.read_chunk_size) {
        Ok(message) => {
            debug!(peer = %peer, bytes = message.len(), "message received");
            sink.on_received(message);
        }
        Err(e) => {
            warn!(peer = %peer, error = %e, "read failed, nothing delivered");
        }
    }
}

/// Switch an accepted stream to blocking reads bounded by the idle timeout.
fn configure_stream(stream: &TcpStream, idle_read_timeout: Duration) -> io::Result<()> {
    let sock = SockRef::from(stream);
    sock.set_nonblocking(false)?;
    sock.set_read_timeout(Some(idle_read_timeout))?;
    Ok(())
}
