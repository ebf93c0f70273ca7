//! # memodb-protocol: the MemoDB text protocol
//!
//! Clients send one command per `\n`-terminated line (a trailing `\r` is
//! ignored). Data commands address a file (path) and a key:
//!
//! ```text
//! GET <path> <key>
//! SET <path> <key> <value...>
//! DEL <path> <key>
//! ```
//!
//! Verbs are case-insensitive. The `SET` value is everything after the key,
//! spaces included. Control words (`help`, `info`, `tree`, `quit`, `exit`)
//! take no arguments.
//!
//! Every response is one or more `\n`-terminated lines; see [`Response`].
//!
//! This crate has no knowledge of sockets or of the store.
//!
//! ```
//! use memodb_protocol::{Command, ParseLimits, Request, parse_line};
//!
//! let request = parse_line(b"set /users alice my secret", &ParseLimits::default()).unwrap();
//! match request {
//!     Request::Data(Command::Set { path, key, value }) => {
//!         assert_eq!(path, "/users");
//!         assert_eq!(key, "alice");
//!         assert_eq!(&value[..], b"my secret");
//!     }
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

mod command;
mod parser;
mod response;

pub use command::{Command, Control, Request, Verb};
pub use parser::{Field, ParseError, ParseLimits, parse_line};
pub use response::{HELP_TEXT, PROMPT, Response, ServerInfo, WELCOME};
