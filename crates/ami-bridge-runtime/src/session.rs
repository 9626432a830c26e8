//! Manager interface session
//!
//! A `Session` drives one connection through its whole life:
//!
//! ```text
//! Idle -> Connected -> Authenticated -> (listening) -> Closed
//! ```
//!
//! `connect` opens the transport, initializes the publisher and starts the event
//! pipeline. `login` authenticates. `listen` reads until the connection fails or the
//! shutdown token is cancelled. `disconnect` tears everything down and may be called
//! from any state, any number of times. A session is not reusable after teardown:
//! once `disconnect` has run, `connect`, `login` and `listen` fail with
//! `SessionError::InvalidState`.

use std::sync::Arc;

use ami_bridge_core::{enrich, fields, Message, Publisher, SessionConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{ConnectionManager, ConnectionStats, Dialer};
use crate::error::{Result, SessionError};
use crate::pipeline::EventPipeline;

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Authenticated,
    Closed,
}

/// Counters for the listen loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages_received: u64,
    pub events_excluded: u64,
    pub events_submitted: u64,
    pub read_timeouts: u64,
}

/// One authenticated event stream from the switch into a publisher
pub struct Session<D: Dialer, P: Publisher> {
    config: Arc<SessionConfig>,
    connection: ConnectionManager<D>,
    publisher: Arc<P>,
    pipeline: Option<EventPipeline>,
    shutdown: CancellationToken,
    logged_in: bool,
    publisher_started: bool,
    torn_down: bool,
    stats: SessionStats,
}

impl<D: Dialer, P: Publisher> Session<D, P> {
    pub fn new(config: SessionConfig, dialer: D, publisher: Arc<P>) -> Self {
        let connection = ConnectionManager::new(dialer, &config);
        Self {
            config: Arc::new(config),
            connection,
            publisher,
            pipeline: None,
            shutdown: CancellationToken::new(),
            logged_in: false,
            publisher_started: false,
            torn_down: false,
            stats: SessionStats::default(),
        }
    }

    /// Use an externally owned token, e.g. a child of an application-wide one
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Clone of the token that ends `listen` when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.torn_down {
            SessionState::Closed
        } else if self.logged_in {
            SessionState::Authenticated
        } else if self.connection.is_connected() {
            SessionState::Connected
        } else {
            SessionState::Idle
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn connection_stats(&self) -> &ConnectionStats {
        self.connection.stats()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.torn_down {
            return Err(SessionError::InvalidState("session has been disconnected"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Open the transport, initialize the publisher and start the pipeline
    ///
    /// If the publisher fails to initialize the transport stays open; the caller
    /// still owns teardown through `disconnect`. Cancelling the shutdown token while
    /// dialing or initializing returns `SessionError::Cancelled`.
    pub async fn connect(&mut self) -> Result<()> {
        self.ensure_open()?;
        let shutdown = self.shutdown.clone();
        self.connection.connect(&shutdown).await?;

        info!("Initializing {} publisher", self.publisher.name());
        self.publisher_started = true;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(SessionError::Cancelled),
            initialized = self.publisher.initialize() => initialized?,
        }

        let pipeline = EventPipeline::start(
            Arc::clone(&self.publisher),
            self.config.worker_count,
            self.config.queue_capacity,
        )?;
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Authenticate with the configured credentials
    pub async fn login(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.connection.is_connected() {
            return Err(SessionError::InvalidState("login requires an open connection"));
        }

        let action = Message::action("Login", self.config.action_id("Login"))
            .with_field(fields::USERNAME, self.config.username.as_str())
            .with_field(fields::SECRET, self.config.secret.as_str());
        self.connection.send(action).await?;

        let reply = self.connection.read_message(self.config.read_timeout).await?;
        if login_accepted(&reply) {
            self.logged_in = true;
            info!(
                "Logged in to {} as {}",
                self.connection.address(),
                self.config.username
            );
            Ok(())
        } else {
            let message = reply.get(fields::MESSAGE).unwrap_or_default().to_string();
            warn!("Login as {} rejected: {}", self.config.username, message);
            Err(SessionError::Authentication { message })
        }
    }

    /// Read events until the connection fails or shutdown is requested
    ///
    /// Read timeouts are expected on a quiet switch and only logged. Excluded events
    /// are dropped; everything else is enriched and queued, waiting while the queue
    /// is full. Cancellation returns `Ok(())` even mid-read or mid-submit.
    pub async fn listen(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.logged_in {
            return Err(SessionError::InvalidState(
                "listen requires an authenticated session",
            ));
        }

        let shutdown = self.shutdown.clone();
        let read_timeout = self.config.read_timeout;
        info!("Listening for events from {}", self.connection.address());

        while self.logged_in {
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                read = self.connection.read_message(read_timeout) => read,
            };

            let message = match read {
                Ok(message) => message,
                Err(e) if e.is_timeout() => {
                    debug!("No message within {:?}, still listening", read_timeout);
                    self.stats.read_timeouts += 1;
                    continue;
                }
                Err(e) => {
                    error!("Read from {} failed: {}", self.connection.address(), e);
                    return Err(e.into());
                }
            };
            self.stats.messages_received += 1;

            let excluded = message
                .event_name()
                .is_some_and(|name| self.config.is_excluded(name));
            if excluded {
                trace!("Dropping excluded event {:?}", message.event_name());
                self.stats.events_excluded += 1;
                continue;
            }

            let event = enrich(message, &self.config.host_device_id);
            let pipeline = self
                .pipeline
                .as_ref()
                .ok_or(SessionError::InvalidState("event pipeline is not running"))?;

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                submitted = pipeline.submit(event) => submitted?,
            }
            self.stats.events_submitted += 1;
        }

        info!("Stopped listening");
        Ok(())
    }

    /// Tear the session down; safe to call repeatedly
    ///
    /// Order: logoff (if authenticated), close the transport, drain and join the
    /// pipeline, destroy the publisher. Failures are logged and never stop the
    /// remaining steps.
    pub async fn disconnect(&mut self) {
        self.torn_down = true;
        if !self.connection.is_connected() && self.pipeline.is_none() && !self.publisher_started
        {
            debug!("Session already disconnected");
            return;
        }

        if self.logged_in {
            let logoff = Message::action("Logoff", self.config.action_id("Logoff"));
            if let Err(e) = self.connection.send(logoff).await {
                warn!("Failed to send logoff: {}", e);
            }
            self.logged_in = false;
        }

        if let Err(e) = self.connection.close().await {
            error!("Failed to close connection to {}: {}", self.connection.address(), e);
        }

        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.shutdown().await {
                error!("Event pipeline shutdown failed: {}", e);
            }
        }

        if self.publisher_started {
            self.publisher_started = false;
            self.publisher.destroy().await;
        }

        info!("Session disconnected");
    }
}

/// Either signal counts as a successful login
fn login_accepted(reply: &Message) -> bool {
    reply.get(fields::RESPONSE) == Some("Success")
        || reply.get(fields::MESSAGE) == Some("Authentication accepted")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_predicate() {
        let ok = Message::new()
            .with_field(fields::RESPONSE, "Success")
            .with_field(fields::MESSAGE, "Authentication accepted");
        assert!(login_accepted(&ok));

        let response_only = Message::new().with_field(fields::RESPONSE, "Success");
        assert!(login_accepted(&response_only));

        let message_only = Message::new()
            .with_field(fields::RESPONSE, "Error")
            .with_field(fields::MESSAGE, "Authentication accepted");
        assert!(login_accepted(&message_only));

        let rejected = Message::new()
            .with_field(fields::RESPONSE, "Error")
            .with_field(fields::MESSAGE, "Authentication failed");
        assert!(!login_accepted(&rejected));
        assert!(!login_accepted(&Message::new()));
    }
}
