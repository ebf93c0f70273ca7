//! Structured requests produced by the parser.

use std::fmt::{self, Display};

use bytes::Bytes;

/// Verb of a data command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Set,
    Del,
}

impl Verb {
    /// Matches a verb case-insensitively.
    pub fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("GET") {
            Some(Self::Get)
        } else if token.eq_ignore_ascii_case("SET") {
            Some(Self::Set)
        } else if token.eq_ignore_ascii_case("DEL") {
            Some(Self::Del)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Set => "SET",
            Self::Del => "DEL",
        }
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command that reads or writes the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch the value of `key` in `path`.
    Get { path: String, key: String },
    /// Store `value` under `key` in `path`, creating the path if needed.
    Set {
        path: String,
        key: String,
        value: Bytes,
    },
    /// Remove `key` from `path`.
    Del { path: String, key: String },
}

impl Command {
    pub fn verb(&self) -> Verb {
        match self {
            Self::Get { .. } => Verb::Get,
            Self::Set { .. } => Verb::Set,
            Self::Del { .. } => Verb::Del,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Get { path, .. } | Self::Set { path, .. } | Self::Del { path, .. } => path,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Get { key, .. } | Self::Set { key, .. } | Self::Del { key, .. } => key,
        }
    }
}

/// Session-level commands that never modify the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Help,
    Info,
    Tree,
    Quit,
}

impl Control {
    /// Matches a whole line against the control words.
    pub fn from_line(line: &str) -> Option<Self> {
        const WORDS: [(&str, Control); 5] = [
            ("help", Control::Help),
            ("info", Control::Info),
            ("tree", Control::Tree),
            ("quit", Control::Quit),
            ("exit", Control::Quit),
        ];

        let line = line.trim();
        WORDS
            .iter()
            .find(|(word, _)| line.eq_ignore_ascii_case(word))
            .map(|&(_, control)| control)
    }
}

/// Any request a client can send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Data(Command),
    Control(Control),
}
