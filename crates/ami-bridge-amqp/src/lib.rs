//! AMI Bridge AMQP Publisher
//!
//! Publishes enriched events to a pre-existing AMQP exchange, routed by host device
//! id. Events that fail to publish (or every event, when configured) are appended to
//! a date-stamped fallback log on local disk.

pub mod client;
pub mod error;
pub mod fallback;
pub mod publisher;

pub use client::{BrokerClient, LapinClient, JSON_CONTENT_TYPE};
pub use error::{AmqpPublisherError, Result};
pub use fallback::FallbackLog;
pub use publisher::{BrokerPublisher, BrokerStats};
