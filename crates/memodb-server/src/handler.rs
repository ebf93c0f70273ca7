//! Request handler that routes parsed lines to the store.

use memodb_protocol::{Command, Control, ParseLimits, Request, Response, ServerInfo, parse_line};
use memodb_store::{Store, StoreError};
use tracing::{debug, instrument, warn};

/// What the connection should do after sending a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep reading commands.
    Continue,
    /// Flush the response, then close.
    Close,
}

/// A response paired with its directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub response: Response,
    pub directive: Directive,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            response,
            directive: Directive::Continue,
        }
    }

    fn close(response: Response) -> Self {
        Self {
            response,
            directive: Directive::Close,
        }
    }
}

/// Handles lines by parsing them and applying them to a [`Store`].
#[derive(Debug, Clone, Default)]
pub struct RequestHandler {
    limits: ParseLimits,
}

impl RequestHandler {
    /// Creates a new request handler enforcing `limits`.
    pub fn new(limits: ParseLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ParseLimits {
        &self.limits
    }

    /// Handles one line (without its `\n`) and returns the response.
    ///
    /// Failures never escape: parse and store errors become `ERR` responses
    /// and the connection stays open.
    #[instrument(skip_all, fields(peer = %session.peer_addr, op))]
    pub fn handle(&self, store: &mut Store, line: &[u8], session: &ServerInfo) -> Outcome {
        let request = match parse_line(line, &self.limits) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "malformed command");
                let raw = line.strip_suffix(b"\r").unwrap_or(line);
                return Outcome::reply(Response::Malformed {
                    raw: String::from_utf8_lossy(raw).into_owned(),
                });
            }
        };

        match request {
            Request::Control(control) => Self::handle_control(control, store, session),
            Request::Data(command) => Outcome::reply(Self::execute(store, command)),
        }
    }

    fn handle_control(control: Control, store: &Store, session: &ServerInfo) -> Outcome {
        match control {
            Control::Help => {
                tracing::Span::current().record("op", "help");
                Outcome::reply(Response::Help)
            }
            Control::Info => {
                tracing::Span::current().record("op", "info");
                Outcome::reply(Response::Info(*session))
            }
            Control::Tree => {
                tracing::Span::current().record("op", "tree");
                Outcome::reply(Response::Tree(store.render_tree()))
            }
            Control::Quit => {
                tracing::Span::current().record("op", "quit");
                Outcome::close(Response::Goodbye)
            }
        }
    }

    fn execute(store: &mut Store, command: Command) -> Response {
        tracing::Span::current().record("op", command.verb().as_str());

        let result = match &command {
            Command::Get { path, key } => store.get(path, key).map(Response::Value),
            Command::Set { path, key, value } => store.set(path, key, value).map(|outcome| {
                debug!(path = %path, key = %key, size = value.len(), ?outcome, "set");
                Response::Ok
            }),
            Command::Del { path, key } => store.delete(path, key).map(|()| Response::Ok),
        };

        result.unwrap_or_else(|e| error_to_response(&command, &e))
    }
}

fn error_to_response(command: &Command, error: &StoreError) -> Response {
    if error.is_not_found() {
        return Response::NotFound {
            path: command.path().to_string(),
            key: command.key().to_string(),
        };
    }
    if let StoreError::OutOfMemory(_) = error {
        warn!(error = %error, "store allocation failed");
    }
    Response::Error(capitalize(&error.to_string()))
}

/// Upper-cases the first letter so error text reads as a sentence.
fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
