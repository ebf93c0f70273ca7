//! # memodb-server: MemoDB server daemon
//!
//! This crate provides the TCP server that exposes a [`memodb_store::Store`]
//! over the line protocol defined in `memodb-protocol`.
//!
//! ## Architecture
//!
//! The server uses `mio` for non-blocking I/O with a single-threaded,
//! poll-based event loop. There is no async runtime and no worker pool: every
//! command is parsed, dispatched and applied to the store to completion
//! before the loop polls again, so store mutations are totally ordered by the
//! order in which connections become readable.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      memodb-server                         │
//! │  ┌────────────┐   ┌─────────────┐   ┌──────────────────┐  │
//! │  │  Listener  │ → │ Connections │ → │  RequestHandler  │  │
//! │  │  (TCP)     │   │ (mio poll)  │   │   (→ Store)      │  │
//! │  └────────────┘   └─────────────┘   └──────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use memodb_server::{Server, ServerConfig};
//! use memodb_store::Store;
//!
//! let config = ServerConfig::new(([127, 0, 0, 1], 12049));
//! let server = Server::with_signal_handling(config, Store::new())?;
//! let summary = server.run()?;
//! println!("served {} connections", summary.connections_accepted);
//! # Ok::<(), memodb_server::ServerError>(())
//! ```

mod config;
mod connection;
mod error;
mod handler;
mod server;

pub use config::{DEFAULT_PORT, MIN_BUFFER_SIZE, ServerConfig};
pub use connection::{CloseReason, ConnectionState};
pub use error::{ServerError, ServerResult};
pub use handler::{Directive, Outcome, RequestHandler};
pub use server::{Server, ShutdownHandle, ShutdownSummary};
