//! Client error types.

use plot_types::{EnvelopeError, KeyError};
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors surfaced by the client facade.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from the WebSocket transport.
///
/// None of these are terminal: the connection manager retries forever.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No socket is open right now.
    #[error("Connection not ready")]
    NotReady,

    /// The socket closed while writing.
    #[error("Connection closed")]
    Closed,

    /// The envelope could not be serialised.
    #[error(transparent)]
    Encode(#[from] EnvelopeError),

    /// The handshake or the TCP/TLS connect failed.
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The connect attempt took too long.
    #[error("Connect attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The socket failed after it was established.
    #[error("WebSocket protocol error: {0}")]
    Protocol(String),
}

/// Errors from cache snapshot storage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage I/O failed for {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),
}

/// Errors from parsing DOT graph text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphParseError {
    #[error("Graph text is empty")]
    Empty,

    #[error("Expected a graph or digraph header")]
    MissingHeader,

    #[error("Unexpected '{found}' at offset {offset}")]
    UnexpectedToken { offset: usize, found: String },

    #[error("Unterminated string starting at offset {0}")]
    UnterminatedString(usize),

    #[error("Unexpected end of graph text")]
    UnexpectedEnd,
}
