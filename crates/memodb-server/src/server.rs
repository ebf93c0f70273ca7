//! The event loop: accepts clients, drives connections and owns the store.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use memodb_protocol::{Response, ServerInfo};
use memodb_store::{Store, StoreStats};

use crate::config::ServerConfig;
use crate::connection::{CloseReason, Connection, ConnectionState, FlushPolicy, ReadStatus};
use crate::error::{ServerError, ServerResult};
use crate::handler::{Directive, RequestHandler};

/// Token for the listening socket.
const LISTENER_TOKEN: Token = Token(0);

/// Token for the shutdown waker.
const WAKER_TOKEN: Token = Token(1);

/// Token for the signal pipe.
#[cfg(unix)]
const SIGNAL_TOKEN: Token = Token(2);

/// Client tokens are allocated upwards from here.
const FIRST_CLIENT_TOKEN: usize = 16;

/// Maximum readiness events handled per poll.
const EVENTS_CAPACITY: usize = 1024;

const IDLE_NOTICE: &str = "Idle timeout, closing connection.";
const LINE_TOO_LONG_NOTICE: &str = "Command too long, closing connection.";

/// Handle for requesting a graceful shutdown from another thread.
///
/// Setting the flag wakes the poll so the loop notices it without waiting
/// for the poll timeout.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("requested", &self.is_shutdown())
            .finish_non_exhaustive()
    }
}

impl ShutdownHandle {
    /// Requests shutdown. Calling it more than once has no further effect.
    pub fn shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.waker.wake() {
                warn!(error = %e, "failed to wake event loop for shutdown");
            }
        }
    }

    /// Returns true once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Counters reported when the event loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Connections admitted over the server's lifetime.
    pub connections_accepted: u64,
    /// Connections turned away because the server was full.
    pub connections_rejected: u64,
    /// Connections still open when shutdown began.
    pub connections_open_at_shutdown: usize,
    /// Store contents at teardown.
    pub store: StoreStats,
}

/// MemoDB server.
pub struct Server {
    config: ServerConfig,
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<Token, Connection>,
    next_token: usize,
    store: Store,
    handler: RequestHandler,
    shutdown: ShutdownHandle,
    #[cfg(unix)]
    signals: Option<signal_hook_mio::v1_0::Signals>,
    accepted: u64,
    rejected: u64,
}

impl Server {
    /// Binds the listener and prepares the event loop.
    ///
    /// The server takes ownership of `store`; it is torn down when
    /// [`Server::run`] returns.
    pub fn new(config: ServerConfig, store: Store) -> ServerResult<Self> {
        config.validate()?;

        let poll = Poll::new()?;
        let mut listener =
            TcpListener::bind(config.bind_addr).map_err(|source| ServerError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN)?);
        let shutdown = ShutdownHandle {
            requested: Arc::new(AtomicBool::new(false)),
            waker,
        };

        info!(
            addr = %local_addr,
            max_connections = config.max_connections,
            interactive = config.interactive,
            "server listening"
        );

        Ok(Self {
            handler: RequestHandler::new(config.limits),
            config,
            poll,
            listener,
            local_addr,
            connections: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
            store,
            shutdown,
            #[cfg(unix)]
            signals: None,
            accepted: 0,
            rejected: 0,
        })
    }

    /// Like [`Server::new`], but SIGINT and SIGTERM (Ctrl-C on Windows)
    /// request a graceful shutdown.
    pub fn with_signal_handling(config: ServerConfig, store: Store) -> ServerResult<Self> {
        let mut server = Self::new(config, store)?;
        server.install_signal_handler()?;
        Ok(server)
    }

    #[cfg(unix)]
    fn install_signal_handler(&mut self) -> ServerResult<()> {
        use signal_hook::consts::{SIGINT, SIGTERM};

        let mut signals = signal_hook_mio::v1_0::Signals::new([SIGINT, SIGTERM])
            .map_err(|e| ServerError::Signal(e.to_string()))?;
        self.poll
            .registry()
            .register(&mut signals, SIGNAL_TOKEN, Interest::READABLE)?;
        self.signals = Some(signals);
        Ok(())
    }

    #[cfg(windows)]
    fn install_signal_handler(&mut self) -> ServerResult<()> {
        let handle = self.shutdown.clone();
        ctrlc::set_handler(move || handle.shutdown()).map_err(|e| ServerError::Signal(e.to_string()))
    }

    #[cfg(not(any(unix, windows)))]
    #[allow(clippy::unnecessary_wraps, clippy::unused_self)]
    fn install_signal_handler(&mut self) -> ServerResult<()> {
        Ok(())
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle that stops the event loop.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs the event loop until shutdown is requested.
    ///
    /// On shutdown every connection is closed without flushing, the listener
    /// is released and the store is torn down.
    pub fn run(mut self) -> ServerResult<ShutdownSummary> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while !self.shutdown.is_shutdown() {
            if let Err(e) = self.poll.poll(&mut events, Some(self.config.poll_timeout)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "poll failed");
                return Err(e.into());
            }

            for event in &events {
                match event.token() {
                    LISTENER_TOKEN => self.accept_connections(),
                    WAKER_TOKEN => {}
                    #[cfg(unix)]
                    SIGNAL_TOKEN => self.handle_signals(),
                    token => self.handle_connection_event(token, event),
                }
            }

            self.housekeeping();
        }

        Ok(self.teardown())
    }

    #[cfg(unix)]
    fn handle_signals(&mut self) {
        let Some(signals) = self.signals.as_mut() else {
            return;
        };
        for signal in signals.pending() {
            info!(signal, "received shutdown signal");
            self.shutdown.shutdown();
        }
    }

    /// Accepts until the listener would block.
    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, mut stream: TcpStream, peer_addr: SocketAddr) {
        let max = self.config.max_connections;
        if self.connections.len() >= max {
            self.rejected += 1;
            warn!(peer = %peer_addr, "{}", ServerError::MaxConnectionsReached(max));
            // Best effort; the socket is dropped either way.
            let notice = Response::AtCapacity {
                max_connections: max,
            }
            .to_bytes();
            if let Err(e) = stream.write_all(&notice) {
                debug!(peer = %peer_addr, error = %e, "capacity notice not delivered");
            }
            return;
        }

        let token = Token(self.next_token);
        self.next_token += 1;

        if let Err(e) = self
            .poll
            .registry()
            .register(&mut stream, token, Interest::READABLE)
        {
            error!(peer = %peer_addr, error = %e, "failed to register connection");
            return;
        }

        let mut conn = Connection::new(
            token,
            stream,
            peer_addr,
            self.config.read_buffer_size,
            self.config.write_buffer_size,
            self.config.output_high_water,
            self.config.max_pending_output,
        );
        conn.activate();
        if self.config.interactive {
            if let Err(e) = conn.queue(&Response::Welcome, true) {
                warn!(peer = %peer_addr, error = %e, "failed to queue welcome");
            }
        }

        self.accepted += 1;
        self.connections.insert(token, conn);
        info!(
            peer = %peer_addr,
            connections = self.connections.len(),
            max_connections = max,
            "client connected"
        );

        if self.config.interactive {
            self.settle(token);
        }
    }

    fn handle_connection_event(&mut self, token: Token, event: &Event) {
        let Some(conn) = self.connections.get_mut(&token) else {
            // Stale event for a connection closed earlier in this batch.
            return;
        };

        if event.is_error() || event.is_write_closed() {
            conn.begin_close(CloseReason::Hangup);
        } else {
            if event.is_readable() {
                self.read_from(token);
            }
            if event.is_writable() {
                self.flush(token);
            }
        }

        self.settle(token);
    }

    /// Reads until the socket would block, handling each complete line.
    ///
    /// Stops early, leaving input in the socket, while the client is behind
    /// on output. [`Server::settle`] calls back in once it catches up.
    fn read_from(&mut self, token: Token) {
        let session = ServerInfo {
            server_addr: self.local_addr,
            connections: self.connections.len(),
            max_connections: self.config.max_connections,
            peer_addr: self
                .connections
                .get(&token)
                .map_or(self.local_addr, |conn| conn.peer_addr),
        };
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        let mut ctx = LineContext {
            store: &mut self.store,
            handler: &self.handler,
            session: &session,
            max_line: self.config.read_buffer_size,
            interactive: self.config.interactive,
        };

        // Lines buffered before an earlier pause.
        ctx.process_lines(conn);

        while !conn.is_closing() {
            if conn.is_backpressured() {
                conn.pause_reading();
                break;
            }
            if conn.is_read_closed() {
                conn.begin_close(CloseReason::PeerClosed);
                break;
            }

            let status = match conn.fill() {
                Ok(status) => status,
                Err(e) => {
                    debug!(peer = %conn.peer_addr, error = %e, "read failed");
                    conn.begin_close(CloseReason::Io);
                    break;
                }
            };

            ctx.process_lines(conn);

            match status {
                ReadStatus::Data(_) => {}
                ReadStatus::WouldBlock => break,
                ReadStatus::Eof => conn.mark_read_closed(),
            }
        }
    }

    fn flush(&mut self, token: Token) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if let Err(e) = conn.write() {
            debug!(peer = %conn.peer_addr, error = %e, "write failed");
            conn.begin_close(CloseReason::Io);
        }
    }

    /// Brings a connection's registration in line with its state.
    ///
    /// Writes eagerly and resumes paused reads once output drains. Then
    /// closes connections whose close policy is satisfied and toggles write
    /// interest as the output queue fills and empties.
    fn settle(&mut self, token: Token) {
        loop {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };

            let policy = conn.close_reason().map(CloseReason::flush_policy);
            if policy != Some(FlushPolicy::Discard) && conn.pending_output() > 0 {
                if let Err(e) = conn.write() {
                    debug!(peer = %conn.peer_addr, error = %e, "write failed");
                    conn.begin_close(CloseReason::Io);
                }
            }

            // Readiness is edge-triggered: input that arrived while paused
            // produces no new event.
            if !conn.take_resumable() {
                break;
            }
            self.read_from(token);
        }

        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };

        if conn.state() == ConnectionState::Closing {
            let draining = conn.close_reason().map(CloseReason::flush_policy)
                == Some(FlushPolicy::Drain)
                && conn.pending_output() > 0;
            if !draining {
                self.close_connection(token);
                return;
            }
        }

        let interest = conn.interest();
        if interest != conn.registered {
            let result = self
                .poll
                .registry()
                .reregister(&mut conn.stream, token, interest);
            match result {
                Ok(()) => conn.registered = interest,
                Err(e) => {
                    warn!(peer = %conn.peer_addr, error = %e, "failed to reregister connection");
                    conn.begin_close(CloseReason::Io);
                    self.close_connection(token);
                }
            }
        }
    }

    fn close_connection(&mut self, token: Token) {
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };
        if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
            debug!(token = conn.token.0, error = %e, "deregister failed");
        }
        conn.mark_closed();

        let reason = conn.close_reason().unwrap_or(CloseReason::Shutdown);
        info!(
            peer = %conn.peer_addr,
            %reason,
            unsent = conn.pending_output(),
            unread = conn.buffered_input(),
            connections = self.connections.len(),
            "client disconnected"
        );
    }

    /// Runs between polls. Closes connections idle past the timeout.
    fn housekeeping(&mut self) {
        let Some(timeout) = self.config.idle_timeout else {
            return;
        };

        let idle: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_idle(timeout))
            .map(|(&token, _)| token)
            .collect();

        for token in idle {
            let Some(conn) = self.connections.get_mut(&token) else {
                continue;
            };
            if conn.is_closing() {
                // Stuck draining to a client that stopped reading.
                self.close_connection(token);
                continue;
            }
            info!(peer = %conn.peer_addr, "closing idle connection");
            if let Err(e) = conn.queue(&Response::Error(IDLE_NOTICE.to_string()), false) {
                debug!(peer = %conn.peer_addr, error = %e, "idle notice not queued");
            }
            conn.begin_close(CloseReason::Idle);
            self.settle(token);
        }
    }

    fn teardown(mut self) -> ShutdownSummary {
        let open = self.connections.len();
        info!(connections = open, "shutting down");

        let tokens: Vec<Token> = self.connections.keys().copied().collect();
        for token in tokens {
            if let Some(conn) = self.connections.get_mut(&token) {
                conn.begin_close(CloseReason::Shutdown);
            }
            self.close_connection(token);
        }

        if let Err(e) = self.poll.registry().deregister(&mut self.listener) {
            debug!(error = %e, "listener deregister failed");
        }
        #[cfg(unix)]
        if let Some(mut signals) = self.signals.take() {
            if let Err(e) = self.poll.registry().deregister(&mut signals) {
                debug!(error = %e, "signal deregister failed");
            }
        }
        drop(self.listener);

        let summary = ShutdownSummary {
            connections_accepted: self.accepted,
            connections_rejected: self.rejected,
            connections_open_at_shutdown: open,
            store: self.store.teardown(),
        };
        info!(
            accepted = summary.connections_accepted,
            rejected = summary.connections_rejected,
            "server stopped"
        );
        summary
    }
}

/// Borrowed state needed to turn buffered lines into responses.
struct LineContext<'a> {
    store: &'a mut Store,
    handler: &'a RequestHandler,
    session: &'a ServerInfo,
    max_line: usize,
    interactive: bool,
}

impl LineContext<'_> {
    /// Handles complete lines from the connection's read buffer until it runs
    /// out or the client falls behind on output. Blank lines get no response.
    fn process_lines(&mut self, conn: &mut Connection) {
        while !conn.is_closing() && !conn.is_backpressured() {
            let line = match conn.next_line(self.max_line) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(peer = %conn.peer_addr, error = %e, "protocol violation");
                    // Ignored on overflow; the connection closes either way.
                    let _ = conn.queue(&Response::Error(LINE_TOO_LONG_NOTICE.to_string()), false);
                    conn.begin_close(CloseReason::ProtocolViolation);
                    break;
                }
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                if self.interactive && conn.queue_prompt().is_err() {
                    conn.begin_close(CloseReason::OutputOverflow);
                }
                continue;
            }

            let outcome = self.handler.handle(self.store, &line, self.session);
            let prompt = self.interactive && outcome.directive == Directive::Continue;
            if let Err(e) = conn.queue(&outcome.response, prompt) {
                warn!(peer = %conn.peer_addr, error = %e, "response exceeds the output ceiling");
                conn.begin_close(CloseReason::OutputOverflow);
                break;
            }
            if outcome.directive == Directive::Close {
                conn.begin_close(CloseReason::ClientQuit);
            }
        }
    }
}
