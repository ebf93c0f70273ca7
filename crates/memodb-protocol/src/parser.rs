//! Line parser.

use std::fmt::{self, Display};

use bytes::Bytes;
use thiserror::Error;

use crate::command::{Command, Control, Request, Verb};

/// Token length limits applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLimits {
    /// Maximum length of the whole path token.
    pub max_path_len: usize,
    /// Maximum key length.
    pub max_key_len: usize,
    /// Maximum value length.
    pub max_value_len: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_path_len: 255,
            max_key_len: 127,
            max_value_len: 1024,
        }
    }
}

/// Which token a length error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Path,
    Key,
    Value,
}

impl Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Path => "path",
            Self::Key => "key",
            Self::Value => "value",
        })
    }
}

/// Reasons a line is not a valid request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}'")]
    UnknownVerb(String),

    #[error("{0} requires a path")]
    MissingPath(Verb),

    #[error("{0} requires a key")]
    MissingKey(Verb),

    #[error("SET requires a non-empty value")]
    MissingValue,

    #[error("{0} takes nothing after the key")]
    TrailingTokens(Verb),

    #[error("{field} of {len} bytes exceeds the {max}-byte limit")]
    TooLong { field: Field, len: usize, max: usize },

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

fn is_separator(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

fn skip_separators(input: &[u8]) -> &[u8] {
    let start = input
        .iter()
        .position(|&b| !is_separator(b))
        .unwrap_or(input.len());
    &input[start..]
}

/// Splits off the next whitespace-delimited token, returning it and the rest.
fn next_token(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let input = skip_separators(input);
    if input.is_empty() {
        return None;
    }
    let end = input
        .iter()
        .position(|&b| is_separator(b))
        .unwrap_or(input.len());
    Some((&input[..end], &input[end..]))
}

fn token_str<'a>(token: &'a [u8], what: &'static str) -> Result<&'a str, ParseError> {
    std::str::from_utf8(token).map_err(|_| ParseError::InvalidUtf8(what))
}

fn check_len(field: Field, len: usize, max: usize) -> Result<(), ParseError> {
    if len > max {
        Err(ParseError::TooLong { field, len, max })
    } else {
        Ok(())
    }
}

/// Parses one line (without its `\n`) into a request.
///
/// A single trailing `\r` is ignored. The `SET` value may hold any bytes;
/// the verb, path and key must be UTF-8.
pub fn parse_line(line: &[u8], limits: &ParseLimits) -> Result<Request, ParseError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    if let Ok(text) = std::str::from_utf8(line) {
        if let Some(control) = Control::from_line(text) {
            return Ok(Request::Control(control));
        }
    }

    let (verb, rest) = next_token(line).ok_or(ParseError::Empty)?;
    let verb_text = token_str(verb, "command")?;
    let verb = Verb::from_token(verb_text)
        .ok_or_else(|| ParseError::UnknownVerb(verb_text.to_string()))?;

    let (path, rest) = next_token(rest).ok_or(ParseError::MissingPath(verb))?;
    let path = token_str(path, "path")?;
    check_len(Field::Path, path.len(), limits.max_path_len)?;

    let (key, rest) = next_token(rest).ok_or(ParseError::MissingKey(verb))?;
    let key = token_str(key, "key")?;
    check_len(Field::Key, key.len(), limits.max_key_len)?;

    let (path, key) = (path.to_string(), key.to_string());
    match verb {
        Verb::Get | Verb::Del => {
            if !skip_separators(rest).is_empty() {
                return Err(ParseError::TrailingTokens(verb));
            }
            Ok(Request::Data(if verb == Verb::Get {
                Command::Get { path, key }
            } else {
                Command::Del { path, key }
            }))
        }
        Verb::Set => {
            let value = skip_separators(rest);
            if value.is_empty() {
                return Err(ParseError::MissingValue);
            }
            check_len(Field::Value, value.len(), limits.max_value_len)?;
            Ok(Request::Data(Command::Set {
                path,
                key,
                value: Bytes::copy_from_slice(value),
            }))
        }
    }
}
