//! Crate-wide error type.
//!
//! Every fallible operation at a component boundary returns `Result<T>`. Errors
//! are tagged by the taxonomy components use to decide whether to retry, fall
//! back, or surface the failure to the caller.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// A tagged error carrying the taxonomy a caller needs to decide how to react.
#[derive(Debug, Error)]
pub enum Error {
    /// Stream closed, send on a closed stream, or an invalid message type arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed length field, inconsistent count, or unknown wire code.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Decompression failure or a size mismatch between a header and its payload.
    #[error("codec error: {0}")]
    Codec(String),

    /// GPU device lost, buffer allocation failure, or file-system quota exceeded.
    #[error("resource error: {0}")]
    Resource(String),

    /// A cancelled operation completed late, or a correlation id was not found.
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// Invalid caller input: empty path, second pending transfer, etc.
    #[error("invalid input: {0}")]
    User(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Error::Concurrency(msg.into())
    }

    pub fn user(msg: impl Into<String>) -> Self {
        Error::User(msg.into())
    }

    /// The taxonomy tag, independent of the detail string.
    pub fn tag(&self) -> ErrorTag {
        match self {
            Error::Transport(_) => ErrorTag::Transport,
            Error::Protocol(_) => ErrorTag::Protocol,
            Error::Codec(_) => ErrorTag::Codec,
            Error::Resource(_) => ErrorTag::Resource,
            Error::Concurrency(_) => ErrorTag::Concurrency,
            Error::User(_) => ErrorTag::User,
            Error::Io(_) => ErrorTag::Resource,
            Error::Json(_) => ErrorTag::Protocol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    Transport,
    Protocol,
    Codec,
    Resource,
    Concurrency,
    User,
}
