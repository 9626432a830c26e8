//! Error types shared across the bridge
//!
//! Read failures carry an explicit `ReadErrorKind` so the read loop can tell a
//! transient deadline expiry apart from a dead connection without probing the
//! underlying I/O error.

use std::io;
use std::time::Duration;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Read Errors
// ----------------------------------------------------------------------------

/// Classification of a failed read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadErrorKind {
    /// The read deadline elapsed before a complete message arrived
    Timeout,
    /// The transport is gone (EOF, reset, or closed locally)
    Closed,
    /// Anything else, including malformed framing
    Other,
}

/// Errors produced while reading a message from the transport
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("no complete message received within {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    Closed,

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

impl ReadError {
    pub fn kind(&self) -> ReadErrorKind {
        match self {
            ReadError::Timeout(_) => ReadErrorKind::Timeout,
            ReadError::Closed => ReadErrorKind::Closed,
            ReadError::Io(err) => match err.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ReadErrorKind::Timeout,
                io::ErrorKind::UnexpectedEof
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected => ReadErrorKind::Closed,
                _ => ReadErrorKind::Other,
            },
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ReadErrorKind::Timeout
    }
}

// ----------------------------------------------------------------------------
// Publisher Errors
// ----------------------------------------------------------------------------

/// Errors raised by publisher implementations
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publisher initialization failed: {0}")]
    Initialization(String),

    #[error("Publish failed: {0}")]
    Delivery(String),

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
