//! Error types
//!
//! One enum per layer. `ServerError` is what a connection handler sees; it
//! separates the benign peer disconnect from every other failure so the
//! per-connection boundary can swallow the former and log the latter.

use std::io;
use thiserror::Error;

/// Errors from the buffer/drain log store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure
    #[error("log store I/O error: {0}")]
    Io(#[from] io::Error),

    /// File expected in an area was not there
    #[error("log file not found: {0}")]
    NotFound(String),

    /// Filename would escape the flat directory
    #[error("invalid log filename: {0:?}")]
    InvalidName(String),
}

/// Errors from frame encoding and decoding
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("protocol I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),

    /// A packed payload arrived where a typed record was expected
    #[error("unexpected packed payload")]
    UnexpectedPacked,
}

impl ProtocolError {
    #[inline]
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    #[inline]
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[inline]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Errors surfaced at the connection boundary
#[derive(Debug, Error)]
pub enum ServerError {
    /// Peer went away before a full message arrived or while we replied
    #[error("peer disconnected")]
    Disconnected,

    #[error(transparent)]
    Protocol(ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("server I/O error: {0}")]
    Io(io::Error),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServerError {
    /// True for the disconnect kinds swallowed at the connection boundary
    pub fn is_benign_disconnect(&self) -> bool {
        match self {
            ServerError::Disconnected => true,
            ServerError::Io(e) | ServerError::Protocol(ProtocolError::Io(e)) => {
                is_disconnect(e)
            }
            _ => false,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        if is_disconnect(&e) {
            ServerError::Disconnected
        } else {
            ServerError::Io(e)
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(io_err) => ServerError::from(io_err),
            other => ServerError::Protocol(other),
        }
    }
}

/// Truncated read or broken write on a peer socket
pub(crate) fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}
