//! AMI Bridge Core
//!
//! Protocol-level building blocks shared by the bridge runtime and its publishers:
//! - `Message`: the field map exchanged with the switch (actions, responses, events)
//! - `AmiCodec`: the CRLF line framing used by the manager interface
//! - `SessionConfig`: the immutable configuration a session is built from
//! - `Publisher`: the downstream capability events are handed to
//!
//! Nothing in this crate performs network I/O on its own.

pub mod codec;
pub mod config;
pub mod errors;
pub mod event;
pub mod message;
pub mod publisher;

pub use codec::{serialize, AmiCodec, MAX_LINE_LENGTH, MAX_MESSAGE_SIZE};
pub use config::{BrokerConfig, SessionConfig, DEFAULT_AMI_PORT};
pub use errors::{PublishError, ReadError, ReadErrorKind};
pub use event::{enrich, enrich_at};
pub use message::{fields, Message};
pub use publisher::Publisher;
