//! Error types for the broker publisher

use std::io;
use std::path::PathBuf;

use ami_bridge_core::PublishError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AmqpPublisherError {
    #[error("Failed to open fallback log in {}: {source}", .dir.display())]
    FallbackOpen {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to broker {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Failed to open broker channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("Exchange {name} ({kind}) is not available: {source}")]
    Exchange {
        name: String,
        kind: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Publish to exchange {exchange} failed: {source}")]
    Publish {
        exchange: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Broker client is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, AmqpPublisherError>;

impl From<AmqpPublisherError> for PublishError {
    fn from(err: AmqpPublisherError) -> Self {
        match err {
            AmqpPublisherError::Publish { .. } | AmqpPublisherError::NotConnected => {
                PublishError::Delivery(err.to_string())
            }
            other => PublishError::Initialization(other.to_string()),
        }
    }
}
