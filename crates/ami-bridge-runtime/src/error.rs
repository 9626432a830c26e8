//! Error types for the session engine and event pipeline

use std::io;

use ami_bridge_core::{PublishError, ReadError};
use thiserror::Error;

/// Errors surfaced by `Session` and `ConnectionManager`
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to connect to {address} after {attempts} attempt(s): {source}")]
    Connection {
        address: String,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Authentication rejected: {message}")]
    Authentication { message: String },

    #[error("Publisher error: {0}")]
    Publisher(#[from] PublishError),

    #[error("Protocol read error: {0}")]
    Read(#[from] ReadError),

    #[error("Failed to write action: {0}")]
    Write(#[source] io::Error),

    #[error("Event pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Invalid session state: {0}")]
    InvalidState(&'static str),

    #[error("Shutdown requested")]
    Cancelled,
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by the event pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Event queue is closed")]
    Closed,

    #[error("Pipeline worker {id} terminated abnormally")]
    WorkerFailed { id: usize },

    #[error("Pipeline needs at least one worker and a queue capacity of at least one")]
    InvalidSize,
}
