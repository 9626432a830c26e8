//! Broker-backed publisher
//!
//! Each event is serialized to JSON and published to the configured exchange with
//! the host device id as routing key. A failed publish is not retried; the event is
//! appended to the fallback log instead. With `log_all_events` set, every event is
//! appended whether or not the publish succeeded.
//!
//! Mandatory publishes that the broker cannot route are returned asynchronously;
//! no return listener is installed, so such events are neither retried nor logged.

use std::sync::atomic::{AtomicU64, Ordering};

use ami_bridge_core::{BrokerConfig, Message, PublishError, Publisher, SessionConfig};
use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::client::{BrokerClient, LapinClient};
use crate::error::AmqpPublisherError;
use crate::fallback::FallbackLog;

/// Counters for publish outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub failed: u64,
    pub logged: u64,
}

/// Publisher sending events to an AMQP exchange
pub struct BrokerPublisher<C: BrokerClient = LapinClient> {
    config: BrokerConfig,
    routing_key: String,
    client: C,
    fallback: OnceCell<FallbackLog>,
    published: AtomicU64,
    failed: AtomicU64,
    logged: AtomicU64,
}

impl BrokerPublisher<LapinClient> {
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_client(config, LapinClient::new())
    }
}

impl<C: BrokerClient> BrokerPublisher<C> {
    pub fn with_client(config: &SessionConfig, client: C) -> Self {
        Self {
            config: config.broker.clone(),
            routing_key: config.host_device_id.clone(),
            client,
            fallback: OnceCell::new(),
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            logged: AtomicU64::new(0),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn fallback_log(&self) -> Option<&FallbackLog> {
        self.fallback.get()
    }

    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            logged: self.logged.load(Ordering::Relaxed),
        }
    }

    async fn log_event(&self, line: &str) {
        match self.fallback.get() {
            Some(log) => match log.append(line).await {
                Ok(()) => {
                    self.logged.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => error!("Failed to append event to {}: {}", log.path().display(), e),
            },
            None => warn!("Fallback log is not open, event dropped: {}", line),
        }
    }
}

#[async_trait]
impl<C: BrokerClient> Publisher for BrokerPublisher<C> {
    async fn initialize(&self) -> Result<(), PublishError> {
        let log = FallbackLog::open(&self.config.fallback_dir)
            .await
            .map_err(|source| AmqpPublisherError::FallbackOpen {
                dir: self.config.fallback_dir.clone(),
                source,
            })?;
        self.fallback
            .set(log)
            .map_err(|_| PublishError::Initialization("publisher already initialized".to_string()))?;

        self.client
            .connect(&self.config)
            .await
            .map_err(|e| PublishError::Initialization(e.to_string()))?;
        info!("Broker publisher ready");
        Ok(())
    }

    async fn consume(&self, event: Message) {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize event: {}", e);
                return;
            }
        };

        let result = self
            .client
            .publish(&self.config.exchange_name, &self.routing_key, payload.as_bytes())
            .await;

        let failed = match result {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                debug!("Published event to {}", self.config.exchange_name);
                false
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!("Failed to send event: {} ({})", payload, e);
                true
            }
        };

        if failed || self.config.log_all_events {
            self.log_event(&payload).await;
        }
    }

    async fn destroy(&self) {
        if let Some(log) = self.fallback.get() {
            info!("Closing fallback event log");
            if let Err(e) = log.close().await {
                error!("Failed to close {}: {}", log.path().display(), e);
            }
        }

        self.client.close().await;

        let stats = self.stats();
        info!(
            "Broker publisher stopped: {} published, {} failed, {} logged",
            stats.published, stats.failed, stats.logged
        );
    }

    fn name(&self) -> &'static str {
        "amqp"
    }
}
