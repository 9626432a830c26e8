//! AMI Bridge Runtime
//!
//! This crate contains the engine of the bridge:
//! - `ConnectionManager`: bounded-retry dialing and the framed transport
//! - `Session`: login, the listen loop and teardown
//! - `EventPipeline`: the bounded queue and worker pool feeding a publisher
//! - `ConsolePublisher`: a publisher writing events as JSON lines
//!
//! Protocol types live in `ami-bridge-core`; broker publishing lives in
//! `ami-bridge-amqp`.

pub mod connection;
pub mod console;
pub mod error;
pub mod pipeline;
pub mod session;

pub use connection::{ConnectionManager, ConnectionStats, Dialer, TcpDialer, DIAL_BACKOFF};
pub use console::ConsolePublisher;
pub use error::{PipelineError, Result, SessionError};
pub use pipeline::EventPipeline;
pub use session::{Session, SessionState, SessionStats};

// Re-export core types for convenience
pub use ami_bridge_core::{
    fields, BrokerConfig, Message, PublishError, Publisher, ReadError, ReadErrorKind,
    SessionConfig,
};
pub use tokio_util::sync::CancellationToken;
