//! Connection state management.

use std::collections::VecDeque;
use std::fmt::{self, Display};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use mio::net::TcpStream;
use mio::{Interest, Token};

use memodb_protocol::{PROMPT, Response};

use crate::error::{ServerError, ServerResult};

/// Bytes pulled from the socket per read call.
const READ_CHUNK: usize = 4096;

/// Lifecycle of a client connection.
///
/// ```text
/// Connecting ──activate──▶ Active ──begin_close──▶ Closing ──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted but not yet registered with the poll.
    Connecting,
    /// Exchanging commands.
    Active,
    /// Waiting for teardown; no further input is processed.
    Closing,
    /// Socket released.
    Closed,
}

/// Why a connection is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent `quit` or `exit`.
    ClientQuit,
    /// The client closed its end of the socket.
    PeerClosed,
    /// The socket reported an error or hangup.
    Hangup,
    /// The client sent a line longer than the read buffer.
    ProtocolViolation,
    /// A read or write failed.
    Io,
    /// A response would push unsent output past the hard ceiling.
    OutputOverflow,
    /// No traffic within the idle timeout.
    Idle,
    /// The server is shutting down.
    Shutdown,
}

/// What happens to queued output when a connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushPolicy {
    /// Keep the connection until every queued byte is written.
    Drain,
    /// Write whatever the socket accepts right now, then close.
    BestEffort,
    /// Close without writing.
    Discard,
}

impl CloseReason {
    pub(crate) fn flush_policy(self) -> FlushPolicy {
        match self {
            Self::ClientQuit | Self::PeerClosed => FlushPolicy::Drain,
            Self::ProtocolViolation | Self::Idle => FlushPolicy::BestEffort,
            Self::Hangup | Self::Io | Self::OutputOverflow | Self::Shutdown => FlushPolicy::Discard,
        }
    }
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientQuit => "client quit",
            Self::PeerClosed => "peer closed",
            Self::Hangup => "hangup",
            Self::ProtocolViolation => "protocol violation",
            Self::Io => "i/o error",
            Self::OutputOverflow => "output overflow",
            Self::Idle => "idle timeout",
            Self::Shutdown => "server shutdown",
        })
    }
}

/// Result of a single read from the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// `n` bytes were appended to the read buffer.
    Data(usize),
    /// Nothing more to read until the next readiness event.
    WouldBlock,
    /// The peer closed its write half.
    Eof,
}

/// State of a client connection.
pub struct Connection {
    /// Poll token identifying this connection.
    pub token: Token,
    /// TCP stream.
    pub stream: TcpStream,
    /// Remote address.
    pub peer_addr: SocketAddr,
    state: ConnectionState,
    close_reason: Option<CloseReason>,
    /// Bytes received but not yet split into lines.
    read_buf: BytesMut,
    /// Scratch space responses are encoded into before being queued.
    encode_buf: BytesMut,
    /// Outbound chunks in the order they must be written.
    pending: VecDeque<Bytes>,
    pending_bytes: usize,
    /// Reading pauses once `pending_bytes` reaches this.
    high_water: usize,
    max_pending: usize,
    /// Input was left unread because the client is behind on output.
    read_paused: bool,
    /// The peer shut down its write half; buffered lines are still served.
    read_closed: bool,
    /// Last activity timestamp for idle timeout tracking.
    last_activity: Instant,
    /// Interest currently registered with the poll.
    pub registered: Interest,
}

impl Connection {
    /// Creates a new connection.
    pub fn new(
        token: Token,
        stream: TcpStream,
        peer_addr: SocketAddr,
        read_buffer_size: usize,
        write_buffer_size: usize,
        high_water: usize,
        max_pending: usize,
    ) -> Self {
        Self {
            token,
            stream,
            peer_addr,
            state: ConnectionState::Connecting,
            close_reason: None,
            read_buf: BytesMut::with_capacity(read_buffer_size),
            encode_buf: BytesMut::with_capacity(write_buffer_size),
            pending: VecDeque::new(),
            pending_bytes: 0,
            high_water,
            max_pending,
            read_paused: false,
            read_closed: false,
            last_activity: Instant::now(),
            registered: Interest::READABLE,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    /// Marks the connection as registered and ready for commands.
    pub fn activate(&mut self) {
        if self.state == ConnectionState::Connecting {
            self.state = ConnectionState::Active;
        }
    }

    /// Moves the connection to `Closing`. The first reason given wins.
    pub fn begin_close(&mut self, reason: CloseReason) {
        if matches!(
            self.state,
            ConnectionState::Closing | ConnectionState::Closed
        ) {
            return;
        }
        self.state = ConnectionState::Closing;
        self.close_reason = Some(reason);
    }

    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub fn is_closing(&self) -> bool {
        self.state == ConnectionState::Closing
    }

    /// Updates the last activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Checks if the connection has been idle for longer than the timeout.
    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    /// True while the client is too far behind on output to accept more
    /// commands.
    pub fn is_backpressured(&self) -> bool {
        self.pending_bytes >= self.high_water
    }

    /// Leaves remaining input in the socket until output drains.
    pub fn pause_reading(&mut self) {
        self.read_paused = true;
    }

    /// Returns true if reading was paused and the output has since drained
    /// below the high-water mark. Clears the pause.
    pub fn take_resumable(&mut self) -> bool {
        if self.read_paused && !self.is_closing() && !self.is_backpressured() {
            self.read_paused = false;
            return true;
        }
        false
    }

    pub fn mark_read_closed(&mut self) {
        self.read_closed = true;
    }

    pub fn is_read_closed(&self) -> bool {
        self.read_closed
    }

    /// Performs one read from the socket into the read buffer.
    pub fn fill(&mut self) -> io::Result<ReadStatus> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(ReadStatus::Eof),
                Ok(n) => {
                    self.read_buf.extend_from_slice(&chunk[..n]);
                    self.touch();
                    return Ok(ReadStatus::Data(n));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadStatus::WouldBlock);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Splits the next complete line off the read buffer, without its `\n`.
    ///
    /// A line (terminator included) must fit in `max_line` bytes. A buffer
    /// that fills up without a newline is a protocol violation.
    pub fn next_line(&mut self, max_line: usize) -> ServerResult<Option<Bytes>> {
        match self.read_buf.iter().position(|&b| b == b'\n') {
            Some(end) if end + 1 > max_line => Err(ServerError::LineTooLong {
                len: end + 1,
                max: max_line,
            }),
            Some(end) => {
                let mut line = self.read_buf.split_to(end + 1);
                line.truncate(end);
                Ok(Some(line.freeze()))
            }
            None if self.read_buf.len() >= max_line => Err(ServerError::LineTooLong {
                len: self.read_buf.len(),
                max: max_line,
            }),
            None => Ok(None),
        }
    }

    /// Bytes received that do not yet form a complete line.
    pub fn buffered_input(&self) -> usize {
        self.read_buf.len()
    }

    /// Queues a response, optionally followed by the interactive prompt.
    pub fn queue(&mut self, response: &Response, prompt: bool) -> ServerResult<()> {
        response.encode(&mut self.encode_buf);
        if prompt {
            self.encode_buf.extend_from_slice(PROMPT.as_bytes());
        }
        let chunk = self.encode_buf.split().freeze();
        self.push(chunk)
    }

    /// Queues the interactive prompt on its own.
    pub fn queue_prompt(&mut self) -> ServerResult<()> {
        self.push(Bytes::from_static(PROMPT.as_bytes()))
    }

    fn push(&mut self, chunk: Bytes) -> ServerResult<()> {
        let pending = self.pending_bytes + chunk.len();
        if pending > self.max_pending {
            return Err(ServerError::OutputOverflow {
                pending,
                max: self.max_pending,
            });
        }
        self.pending_bytes = pending;
        self.pending.push_back(chunk);
        Ok(())
    }

    /// Bytes queued but not yet written.
    pub fn pending_output(&self) -> usize {
        self.pending_bytes
    }

    /// Writes queued chunks to the socket in order.
    ///
    /// Returns `true` if the queue was fully drained.
    pub fn write(&mut self) -> io::Result<bool> {
        while let Some(chunk) = self.pending.front_mut() {
            match self.stream.write(chunk) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write to socket",
                    ));
                }
                Ok(n) => {
                    self.pending_bytes -= n;
                    self.last_activity = Instant::now();
                    if n == chunk.len() {
                        self.pending.pop_front();
                    } else {
                        chunk.advance(n);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    // Socket not ready for writing
                    return Ok(false);
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Returns the interest flags for this connection.
    pub fn interest(&self) -> Interest {
        if self.pending.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::thread;

    fn pair(max_pending: usize) -> (Connection, std::net::TcpStream) {
        pair_with(max_pending, max_pending)
    }

    /// Builds a connection around one end of a loopback socket pair.
    fn pair_with(high_water: usize, max_pending: usize) -> (Connection, std::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let conn = Connection::new(
            Token(16),
            TcpStream::from_std(server),
            peer,
            4096,
            4096,
            high_water,
            max_pending,
        );
        (conn, client)
    }

    fn feed(conn: &mut Connection, bytes: &[u8]) {
        conn.read_buf.extend_from_slice(bytes);
    }

    #[test]
    fn lifecycle_transitions() {
        let (mut conn, _client) = pair(1024);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        conn.activate();
        assert_eq!(conn.state(), ConnectionState::Active);

        conn.begin_close(CloseReason::ClientQuit);
        conn.begin_close(CloseReason::Hangup);
        assert!(conn.is_closing());
        assert_eq!(conn.close_reason(), Some(CloseReason::ClientQuit));

        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn lines_are_reassembled_across_reads() {
        let (mut conn, _client) = pair(1024);

        feed(&mut conn, b"GET /us");
        assert!(conn.next_line(4096).unwrap().is_none());

        feed(&mut conn, b"ers alice\r\nSET /a b c\n");
        assert_eq!(&conn.next_line(4096).unwrap().unwrap()[..], b"GET /users alice\r");
        assert_eq!(&conn.next_line(4096).unwrap().unwrap()[..], b"SET /a b c");
        assert!(conn.next_line(4096).unwrap().is_none());
        assert_eq!(conn.buffered_input(), 0);
    }

    #[test]
    fn full_buffer_without_newline_is_rejected() {
        let (mut conn, _client) = pair(1024);
        feed(&mut conn, &[b'a'; 16]);
        assert!(matches!(
            conn.next_line(16),
            Err(ServerError::LineTooLong { len: 16, max: 16 })
        ));
    }

    #[test]
    fn over_long_terminated_line_is_rejected() {
        let (mut conn, _client) = pair(1024);
        feed(&mut conn, b"0123456789\n");
        assert!(conn.next_line(10).is_err());
        assert!(conn.next_line(11).unwrap().is_some());
    }

    #[test]
    fn queued_output_drives_interest() {
        let (mut conn, _client) = pair(1024);
        assert_eq!(conn.interest(), Interest::READABLE);

        conn.queue(&Response::Ok, false).unwrap();
        conn.queue(&Response::Goodbye, true).unwrap();
        assert_eq!(conn.pending_output(), "OK\n".len() + "Goodbye!\n> ".len());
        assert_eq!(conn.interest(), Interest::READABLE | Interest::WRITABLE);
    }

    #[test]
    fn write_drains_in_order() {
        let (mut conn, mut client) = pair(1024);
        conn.queue(&Response::Ok, false).unwrap();
        conn.queue(&Response::Value(Bytes::from_static(b"v")), false).unwrap();

        assert!(conn.write().unwrap());
        assert_eq!(conn.pending_output(), 0);
        assert_eq!(conn.interest(), Interest::READABLE);

        let mut received = [0u8; 9];
        client.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"OK\nOK: v\n");
    }

    #[test]
    fn blocked_write_keeps_write_interest_until_drained() {
        const RESPONSES: usize = 4096;
        const VALUE_LEN: usize = 8 * 1024;

        let (mut conn, client) = pair(64 * 1024 * 1024);
        for i in 0..RESPONSES {
            let value = vec![b'a' + (i % 26) as u8; VALUE_LEN];
            conn.queue(&Response::Value(Bytes::from(value)), false).unwrap();
        }

        // Far more than loopback socket buffers hold while nobody reads.
        assert!(!conn.write().unwrap());
        assert!(conn.pending_output() > 0);
        assert_eq!(conn.interest(), Interest::READABLE | Interest::WRITABLE);

        let reader = thread::spawn(move || {
            let mut reader = BufReader::new(client);
            let mut line = Vec::new();
            for i in 0..RESPONSES {
                line.clear();
                reader.read_until(b'\n', &mut line).unwrap();
                assert_eq!(line.len(), "OK: ".len() + VALUE_LEN + 1);
                assert_eq!(line[4], b'a' + (i % 26) as u8, "response {i} out of order");
            }
        });

        while !conn.write().unwrap() {
            assert_eq!(conn.interest(), Interest::READABLE | Interest::WRITABLE);
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(conn.pending_output(), 0);
        assert_eq!(conn.interest(), Interest::READABLE);
        reader.join().unwrap();
    }

    #[test]
    fn backpressure_pauses_until_output_drains() {
        let (mut conn, mut client) = pair_with(8, 1024);
        conn.activate();
        conn.queue(&Response::Value(Bytes::from_static(b"value")), false).unwrap();
        assert!(conn.is_backpressured());

        conn.pause_reading();
        assert!(!conn.take_resumable());

        assert!(conn.write().unwrap());
        assert!(!conn.is_backpressured());
        assert!(conn.take_resumable());
        assert!(!conn.take_resumable());

        let mut received = [0u8; 10];
        client.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"OK: value\n");
    }

    #[test]
    fn closing_connection_never_resumes() {
        let (mut conn, _client) = pair_with(8, 1024);
        conn.activate();
        conn.pause_reading();
        conn.begin_close(CloseReason::Idle);
        assert!(!conn.take_resumable());
    }

    #[test]
    fn writes_count_as_activity() {
        let (mut conn, _client) = pair(1024);
        thread::sleep(Duration::from_millis(30));
        assert!(conn.is_idle(Duration::from_millis(20)));

        conn.queue(&Response::Ok, false).unwrap();
        assert!(conn.write().unwrap());
        assert!(!conn.is_idle(Duration::from_millis(20)));
    }

    #[test]
    fn prompt_can_be_queued_alone() {
        let (mut conn, mut client) = pair(1024);
        conn.queue_prompt().unwrap();
        assert_eq!(conn.pending_output(), PROMPT.len());
        assert!(conn.write().unwrap());

        let mut received = [0u8; 2];
        client.read_exact(&mut received).unwrap();
        assert_eq!(&received, b"> ");
    }

    #[test]
    fn pending_output_is_bounded() {
        let (mut conn, _client) = pair(4);
        conn.queue(&Response::Ok, false).unwrap();
        assert!(matches!(
            conn.queue(&Response::Ok, false),
            Err(ServerError::OutputOverflow { pending: 6, max: 4 })
        ));
        assert_eq!(conn.pending_output(), 3);
    }

    #[test]
    fn close_reasons_map_to_flush_policies() {
        assert_eq!(CloseReason::ClientQuit.flush_policy(), FlushPolicy::Drain);
        assert_eq!(CloseReason::PeerClosed.flush_policy(), FlushPolicy::Drain);
        assert_eq!(CloseReason::Idle.flush_policy(), FlushPolicy::BestEffort);
        assert_eq!(CloseReason::Hangup.flush_policy(), FlushPolicy::Discard);
        assert_eq!(CloseReason::Shutdown.flush_policy(), FlushPolicy::Discard);
    }
}
