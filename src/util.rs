use crate::attributes::{self, AttributeMap};
use thiserror::Error;

pub(crate) const PREFIX_SET: &str = "set";
pub(crate) const PREFIX_GET: &str = "get";
pub(crate) const NOT_FOUND: &str = "notfound";

/// Reply written back to a peer, terminated by the framing delimiter.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ServerMessage {
    Ack,
    NotFound,
    Attributes(String),
}

impl ServerMessage {
    pub(crate) fn found(map: &AttributeMap, separator: char) -> Self {
        ServerMessage::Attributes(attributes::encode(map, separator))
    }

    pub(crate) fn frame(&self, delimiter: &str) -> String {
        format!(
            "{}{delimiter}",
            match self {
                ServerMessage::Ack => "",
                ServerMessage::NotFound => NOT_FOUND,
                ServerMessage::Attributes(encoded) => encoded.as_str(),
            }
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ClientMessage {
    Empty,
    Set(AttributeMap),
    Get(String),
    Unknown(String),
}

impl ClientMessage {
    pub(crate) fn parse(s: &str, separator: char, delimiter: &str) -> Self {
        if s.is_empty() {
            return ClientMessage::Empty;
        }
        let (prefix, rest) = match s.split_once(separator) {
            Some((prefix, rest)) => (prefix, rest),
            None => (s, ""),
        };
        match prefix {
            PREFIX_SET => ClientMessage::Set(attributes::decode(rest, separator)),
            PREFIX_GET => {
                let target = rest.strip_suffix(delimiter).unwrap_or(rest);
                ClientMessage::Get(target.to_string())
            }
            other => ClientMessage::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("peer disconnected!")]
    Disconnected,
    #[error("message timed out!")]
    TimedOut,
    #[error("message is too long!")]
    TooLong,
    #[error("message was not valid utf-8!")]
    InvalidUtf8,
    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
    #[error("accept loop panicked")]
    Panicked,
    #[error("server is already running")]
    AlreadyRunning,
    #[error("message delimiter must not be empty")]
    EmptyDelimiter,
}
