//! Response encoding.

use std::net::SocketAddr;

use bytes::{BufMut, Bytes, BytesMut};

/// Greeting sent on connect in interactive mode.
pub const WELCOME: &str = "Welcome to MemoDB! Type 'help' for commands.";

/// Prompt appended after each response in interactive mode.
pub const PROMPT: &str = "> ";

/// Static command listing returned by `help`.
pub const HELP_TEXT: &str = "\
Available commands:
  help                      - Show this help message
  info                      - Show server information
  tree                      - Show the file tree
  quit | exit               - Disconnect from server
  GET <file> <key>          - Retrieve a value from a file
  SET <file> <key> <value>  - Set a value in a file
  DEL <file> <key>          - Delete a key-value pair from a file
";

/// Introspection data reported by `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerInfo {
    /// Address the server is listening on.
    pub server_addr: SocketAddr,
    /// Currently open connections.
    pub connections: usize,
    /// Configured connection capacity.
    pub max_connections: usize,
    /// The caller's address.
    pub peer_addr: SocketAddr,
}

/// A response to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Successful `SET` or `DEL`.
    Ok,
    /// Successful `GET`.
    Value(Bytes),
    /// `GET`/`DEL` on a missing path or key.
    NotFound { path: String, key: String },
    /// The line could not be parsed; `raw` echoes it back.
    Malformed { raw: String },
    /// Any other failure.
    Error(String),
    /// Farewell before the server closes the connection.
    Goodbye,
    Help,
    Info(ServerInfo),
    /// Rendered file tree, one line per node or entry.
    Tree(String),
    Welcome,
    /// The connection is refused because the server is full.
    AtCapacity { max_connections: usize },
}

impl Response {
    /// Appends the encoded response to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Ok => buf.put_slice(b"OK\n"),
            Self::Value(value) => {
                buf.reserve(value.len() + 5);
                buf.put_slice(b"OK: ");
                buf.put_slice(value);
                buf.put_u8(b'\n');
            }
            Self::NotFound { path, key } => {
                put_line(buf, &format!("ERR: Key '{key}' not found in file '{path}'."));
            }
            Self::Malformed { raw } => put_line(
                buf,
                &format!(
                    "ERR: Malformed command or invalid arguments for '{raw}'. Type 'help' for syntax."
                ),
            ),
            Self::Error(message) => put_line(buf, &format!("ERR: {message}")),
            Self::Goodbye => buf.put_slice(b"Goodbye!\n"),
            Self::Help => buf.put_slice(HELP_TEXT.as_bytes()),
            Self::Info(info) => buf.put_slice(
                format!(
                    "Server Information:\n  Host: {}\n  Connected clients: {}/{}\n  Your IP: {}\n",
                    info.server_addr, info.connections, info.max_connections, info.peer_addr
                )
                .as_bytes(),
            ),
            Self::Tree(rendered) => {
                buf.put_slice(rendered.as_bytes());
                if !rendered.ends_with('\n') {
                    buf.put_u8(b'\n');
                }
            }
            Self::Welcome => put_line(buf, WELCOME),
            Self::AtCapacity { max_connections } => put_line(
                buf,
                &format!(
                    "ERR: Server is at capacity ({max_connections} connections). Try again later."
                ),
            ),
        }
    }

    /// Encodes the response into a standalone buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Returns true for `ERR` responses.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::Malformed { .. } | Self::Error(_) | Self::AtCapacity { .. }
        )
    }
}

fn put_line(buf: &mut BytesMut, line: &str) {
    buf.reserve(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
}
