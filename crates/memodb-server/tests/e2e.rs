//! End-to-end tests over loopback TCP.
//!
//! Each test runs a real server on an ephemeral port in a background thread
//! and talks to it with blocking std sockets.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use memodb_protocol::HELP_TEXT;
use memodb_server::{Server, ServerConfig, ServerResult, ShutdownHandle, ShutdownSummary};
use memodb_store::Store;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Harness
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    handle: ShutdownHandle,
    worker: Option<JoinHandle<ServerResult<ShutdownSummary>>>,
}

impl TestServer {
    fn start() -> Self {
        Self::with_config(|config| config)
    }

    fn with_config(customize: impl FnOnce(ServerConfig) -> ServerConfig) -> Self {
        let config = customize(
            ServerConfig::new(([127, 0, 0, 1], 0)).with_poll_timeout(Duration::from_millis(50)),
        );
        let server = Server::new(config, Store::new()).expect("server should bind");
        let addr = server.local_addr();
        let handle = server.shutdown_handle();
        let worker = thread::spawn(move || server.run());
        Self {
            addr,
            handle,
            worker: Some(worker),
        }
    }

    fn connect(&self) -> Client {
        Client::connect(self.addr)
    }

    fn stop(mut self) -> ShutdownSummary {
        self.handle.shutdown();
        self.worker
            .take()
            .expect("worker present")
            .join()
            .expect("server thread panicked")
            .expect("server returned an error")
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream.set_read_timeout(Some(IO_TIMEOUT)).unwrap();
        stream.set_write_timeout(Some(IO_TIMEOUT)).unwrap();
        let writer = stream.try_clone().unwrap();
        Self {
            reader: BufReader::new(stream),
            writer,
        }
    }

    fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
        self.writer.flush().unwrap();
    }

    fn send(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes());
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).expect("read response");
        assert!(n > 0, "connection closed while waiting for a response");
        line
    }

    fn read_exact(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.reader.read_exact(&mut buf).expect("read bytes");
        buf
    }

    fn request(&mut self, line: &str) -> String {
        self.send(line);
        self.read_line()
    }

    /// Writes `bytes` from a background thread so the caller can stay
    /// silent while the server runs ahead. Optionally half-closes afterwards.
    fn send_in_background(&self, bytes: Vec<u8>, then_shutdown: bool) -> JoinHandle<()> {
        let mut writer = self.writer.try_clone().unwrap();
        thread::spawn(move || {
            writer.write_all(&bytes).unwrap();
            if then_shutdown {
                writer.shutdown(Shutdown::Write).unwrap();
            }
        })
    }

    /// Value of the `Connected clients` line from `info`.
    fn connected_clients(&mut self) -> String {
        self.send("info");
        let lines: Vec<String> = (0..4).map(|_| self.read_line()).collect();
        lines[2].trim().to_string()
    }

    /// Returns true once the server has closed the connection.
    fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 64];
        match self.reader.read(&mut buf) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
            ),
        }
    }
}

// ============================================================================
// Command Tests
// ============================================================================

#[test]
fn set_get_del_scenario() {
    let server = TestServer::start();
    let mut client = server.connect();

    assert_eq!(client.request("SET /users alice secret"), "OK\n");
    assert_eq!(client.request("GET /users alice"), "OK: secret\n");
    assert_eq!(client.request("DEL /users alice"), "OK\n");
    assert_eq!(
        client.request("GET /users alice"),
        "ERR: Key 'alice' not found in file '/users'.\n"
    );
    assert!(client.request("GET /missing alice").starts_with("ERR: "));
}

#[test]
fn overwrite_returns_latest_value() {
    let server = TestServer::start();
    let mut client = server.connect();

    assert_eq!(client.request("SET /a/b/c k first"), "OK\n");
    assert_eq!(client.request("SET /a/b/c k second value"), "OK\n");
    assert_eq!(client.request("GET /a/b/c k"), "OK: second value\n");
}

#[test]
fn crlf_terminated_lines_are_accepted() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.send_raw(b"SET /users bob pw\r\n");
    assert_eq!(client.read_line(), "OK\n");
    client.send_raw(b"GET /users bob\r\n");
    assert_eq!(client.read_line(), "OK: pw\n");
}

#[test]
fn malformed_commands_keep_the_connection_open() {
    let server = TestServer::start();
    let mut client = server.connect();

    assert_eq!(
        client.request("GET /users"),
        "ERR: Malformed command or invalid arguments for 'GET /users'. Type 'help' for syntax.\n"
    );
    assert!(client.request("FROB x y").starts_with("ERR: Malformed"));
    assert_eq!(client.request("SET /ok k v"), "OK\n");
}

#[test]
fn pipelined_commands_are_answered_in_order() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.send_raw(b"SET /p a 1\nSET /p b 2\nGET /p a\nGET /p b\nDEL /p a\nGET /p a\n");

    assert_eq!(client.read_line(), "OK\n");
    assert_eq!(client.read_line(), "OK\n");
    assert_eq!(client.read_line(), "OK: 1\n");
    assert_eq!(client.read_line(), "OK: 2\n");
    assert_eq!(client.read_line(), "OK\n");
    assert_eq!(client.read_line(), "ERR: Key 'a' not found in file '/p'.\n");
}

#[test]
fn blank_lines_get_no_response() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.send_raw(b"\nSET /a k v\n  \r\n\t\nGET /a k\n");

    assert_eq!(client.read_line(), "OK\n");
    assert_eq!(client.read_line(), "OK: v\n");
}

#[test]
fn lines_split_across_writes_are_reassembled() {
    let server = TestServer::start();
    let mut client = server.connect();
    assert_eq!(client.request("SET /users alice secret"), "OK\n");

    client.send_raw(b"GET /us");
    thread::sleep(Duration::from_millis(100));
    client.send_raw(b"ers alice\n");

    assert_eq!(client.read_line(), "OK: secret\n");
}

#[test]
fn clients_share_one_namespace_but_disjoint_paths_stay_isolated() {
    let server = TestServer::start();
    let mut first = server.connect();
    let mut second = server.connect();

    assert_eq!(first.request("SET /first key one"), "OK\n");
    assert_eq!(second.request("SET /second key two"), "OK\n");

    assert_eq!(first.request("GET /first key"), "OK: one\n");
    assert_eq!(second.request("GET /second key"), "OK: two\n");
    assert!(first.request("GET /first other").starts_with("ERR: "));

    // Same path, visible to both.
    assert_eq!(second.request("GET /first key"), "OK: one\n");
}

// ============================================================================
// Backpressure Tests
// ============================================================================

#[test]
fn burst_larger_than_output_ceiling_is_answered_in_full() {
    const REQUESTS: usize = 4000;

    let server = TestServer::start();
    let mut client = server.connect();
    let value = "x".repeat(1000);
    assert_eq!(client.request(&format!("SET /v k {value}")), "OK\n");

    // About 4 MB of responses, several times the 1 MiB output ceiling.
    let mut burst = String::new();
    for i in 0..REQUESTS {
        burst.push_str(if i % 2 == 0 { "GET /v k\n" } else { "GET /v missing\n" });
    }
    let sender = client.send_in_background(burst.into_bytes(), false);

    thread::sleep(Duration::from_millis(300));
    let hit = format!("OK: {value}\n");
    let miss = "ERR: Key 'missing' not found in file '/v'.\n";
    for i in 0..REQUESTS {
        let expected = if i % 2 == 0 { hit.as_str() } else { miss };
        assert_eq!(client.read_line(), expected, "response {i}");
    }
    sender.join().unwrap();

    assert_eq!(client.request("SET /v k done"), "OK\n");
    assert_eq!(client.request("GET /v k"), "OK: done\n");
}

#[test]
fn half_closed_client_receives_every_response_before_close() {
    const REQUESTS: usize = 2000;

    let server = TestServer::start();
    let mut client = server.connect();
    let value = "y".repeat(1000);
    assert_eq!(client.request(&format!("SET /v k {value}")), "OK\n");

    let sender = client.send_in_background("GET /v k\n".repeat(REQUESTS).into_bytes(), true);

    thread::sleep(Duration::from_millis(300));
    let expected = format!("OK: {value}\n");
    for i in 0..REQUESTS {
        assert_eq!(client.read_line(), expected, "response {i}");
    }
    sender.join().unwrap();
    assert!(client.is_closed());
}

// ============================================================================
// Control Command Tests
// ============================================================================

#[test]
fn quit_says_goodbye_and_closes() {
    let server = TestServer::start();
    let mut client = server.connect();

    assert_eq!(client.request("quit"), "Goodbye!\n");
    assert!(client.is_closed());
}

#[test]
fn exit_is_an_alias_for_quit() {
    let server = TestServer::start();
    let mut client = server.connect();

    assert_eq!(client.request("exit"), "Goodbye!\n");
    assert!(client.is_closed());
}

#[test]
fn help_lists_commands() {
    let server = TestServer::start();
    let mut client = server.connect();

    client.send("help");
    let mut text = String::new();
    for _ in 0..HELP_TEXT.lines().count() {
        text.push_str(&client.read_line());
    }
    assert_eq!(text, HELP_TEXT);
}

#[test]
fn info_reports_addresses_and_capacity() {
    let server = TestServer::with_config(|config| config.with_max_connections(8));
    let mut client = server.connect();
    let local = client.writer.local_addr().unwrap();

    client.send("info");
    assert_eq!(client.read_line(), "Server Information:\n");
    assert_eq!(client.read_line(), format!("  Host: {}\n", server.addr));
    assert_eq!(client.read_line(), "  Connected clients: 1/8\n");
    assert_eq!(client.read_line(), format!("  Your IP: {local}\n"));
}

#[test]
fn tree_lists_paths_and_sizes() {
    let server = TestServer::start();
    let mut client = server.connect();
    client.request("SET /users alice secret");

    client.send("tree");
    assert_eq!(client.read_line(), "/\n");
    assert_eq!(client.read_line(), "  users/\n");
    assert_eq!(client.read_line(), "    alice (6 bytes)\n");
}

// ============================================================================
// Connection Lifecycle Tests
// ============================================================================

#[test]
fn over_long_line_closes_only_that_connection() {
    let server = TestServer::start();
    let mut healthy = server.connect();
    let mut offender = server.connect();
    assert_eq!(healthy.request("SET /users alice secret"), "OK\n");

    offender.send_raw(&[b'a'; 4096]);

    assert_eq!(
        offender.read_line(),
        "ERR: Command too long, closing connection.\n"
    );
    assert!(offender.is_closed());
    assert_eq!(healthy.request("GET /users alice"), "OK: secret\n");
}

#[test]
fn abrupt_disconnect_does_not_affect_others() {
    let server = TestServer::start();
    let mut survivor = server.connect();

    {
        let mut leaver = server.connect();
        leaver.send_raw(b"SET /gone k v\nGET /go");
    }

    thread::sleep(Duration::from_millis(100));
    assert_eq!(survivor.request("GET /gone k"), "OK: v\n");
}

#[test]
fn fully_shut_down_peer_is_released() {
    let server = TestServer::with_config(|config| config.with_max_connections(2));
    let mut observer = server.connect();

    let mut leaver = server.connect();
    assert_eq!(leaver.request("SET /x k v"), "OK\n");
    leaver.writer.shutdown(Shutdown::Both).unwrap();
    drop(leaver);

    let deadline = Instant::now() + IO_TIMEOUT;
    while observer.connected_clients() != "Connected clients: 1/2" {
        assert!(Instant::now() < deadline, "closed peer was never released");
        thread::sleep(Duration::from_millis(20));
    }

    let mut newcomer = server.connect();
    assert_eq!(newcomer.request("GET /x k"), "OK: v\n");
}

#[test]
fn connections_beyond_capacity_are_refused() {
    let server = TestServer::with_config(|config| config.with_max_connections(1));
    let mut admitted = server.connect();
    assert_eq!(admitted.request("SET /a k v"), "OK\n");

    let mut refused = server.connect();
    assert_eq!(
        refused.read_line(),
        "ERR: Server is at capacity (1 connections). Try again later.\n"
    );
    assert!(refused.is_closed());

    assert_eq!(admitted.request("GET /a k"), "OK: v\n");

    let summary = server.stop();
    assert_eq!(summary.connections_accepted, 1);
    assert_eq!(summary.connections_rejected, 1);
}

#[test]
fn idle_connections_are_closed() {
    let server =
        TestServer::with_config(|config| config.with_idle_timeout(Some(Duration::from_millis(200))));
    let mut client = server.connect();

    assert_eq!(
        client.read_line(),
        "ERR: Idle timeout, closing connection.\n"
    );
    assert!(client.is_closed());
}

#[test]
fn interactive_mode_greets_and_prompts() {
    let server = TestServer::with_config(|config| config.with_interactive(true));
    let mut client = server.connect();

    let welcome = b"Welcome to MemoDB! Type 'help' for commands.\n> ";
    assert_eq!(client.read_exact(welcome.len()), welcome);

    client.send("SET /a k v");
    assert_eq!(client.read_exact(5), b"OK\n> ");

    assert_eq!(client.request("quit"), "Goodbye!\n");
    assert!(client.is_closed());
}

#[test]
fn interactive_blank_line_only_reprompts() {
    let server = TestServer::with_config(|config| config.with_interactive(true));
    let mut client = server.connect();
    let welcome = b"Welcome to MemoDB! Type 'help' for commands.\n> ";
    assert_eq!(client.read_exact(welcome.len()), welcome);

    client.send_raw(b"\r\n");
    assert_eq!(client.read_exact(2), b"> ");

    client.send("SET /a k v");
    assert_eq!(client.read_exact(5), b"OK\n> ");
}

#[test]
fn shutdown_closes_clients_and_reports_store_contents() {
    let server = TestServer::start();
    let mut client = server.connect();
    assert_eq!(client.request("SET /users alice secret"), "OK\n");
    assert_eq!(client.request("SET /users/profiles admin root"), "OK\n");

    let summary = server.stop();

    assert_eq!(summary.connections_accepted, 1);
    assert_eq!(summary.connections_open_at_shutdown, 1);
    assert_eq!(summary.store.leaves, 2);
    assert_eq!(summary.store.nodes, 3);
    assert!(client.is_closed());
}
