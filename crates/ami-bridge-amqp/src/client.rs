//! Broker client abstraction
//!
//! `BrokerPublisher` talks to the broker only through `BrokerClient`, so tests can
//! swap in a client that fails on demand. `LapinClient` is the production AMQP 0-9-1
//! implementation.

use ami_bridge_core::BrokerConfig;
use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::error::{AmqpPublisherError, Result};

/// Content type attached to every published event
pub const JSON_CONTENT_TYPE: &str = "application/json";

const CLOSE_REPLY_CODE: u16 = 200;
const CLOSE_REPLY_TEXT: &str = "ami-bridge shutting down";

/// Minimal broker operations used by the publisher
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Connect, open a channel and verify the configured exchange exists
    async fn connect(&self, config: &BrokerConfig) -> Result<()>;

    /// Publish one JSON payload with mandatory delivery
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()>;

    /// Close the channel and the connection, each best-effort
    async fn close(&self);
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

// ----------------------------------------------------------------------------
// Lapin Client
// ----------------------------------------------------------------------------

/// AMQP client built on lapin
#[derive(Default)]
pub struct LapinClient {
    connection: RwLock<Option<Connection>>,
    channel: RwLock<Option<Channel>>,
}

impl LapinClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerClient for LapinClient {
    async fn connect(&self, config: &BrokerConfig) -> Result<()> {
        info!("Connecting to broker {}", config.url);
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|source| AmqpPublisherError::Connect {
                url: config.url.clone(),
                source,
            })?;
        info!("Connected to broker");

        // Held from here on; `close` releases them if a later step fails
        let channel = connection.create_channel().await;
        *self.connection.write().await = Some(connection);
        let channel = channel.map_err(AmqpPublisherError::Channel)?;
        *self.channel.write().await = Some(channel.clone());

        // Passive: the exchange must already exist, it is never created here
        channel
            .exchange_declare(
                &config.exchange_name,
                exchange_kind(&config.exchange_type),
                ExchangeDeclareOptions {
                    passive: true,
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| AmqpPublisherError::Exchange {
                name: config.exchange_name.clone(),
                kind: config.exchange_type.clone(),
                source,
            })?;

        info!(
            "Exchange {} ({}) verified",
            config.exchange_name, config.exchange_type
        );
        Ok(())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        let channel = self
            .channel
            .read()
            .await
            .clone()
            .ok_or(AmqpPublisherError::NotConnected)?;

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    mandatory: true,
                    ..BasicPublishOptions::default()
                },
                payload,
                BasicProperties::default().with_content_type(JSON_CONTENT_TYPE.into()),
            )
            .await
            .map(|_confirm| ())
            .map_err(|source| AmqpPublisherError::Publish {
                exchange: exchange.to_string(),
                source,
            })
    }

    async fn close(&self) {
        if let Some(channel) = self.channel.write().await.take() {
            info!("Closing broker channel");
            if let Err(e) = channel.close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT).await {
                error!("Failed to close broker channel: {}", e);
            }
        }

        if let Some(connection) = self.connection.write().await.take() {
            info!("Closing broker connection");
            if let Err(e) = connection.close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT).await {
                error!("Failed to close broker connection: {}", e);
            }
        }
    }
}
