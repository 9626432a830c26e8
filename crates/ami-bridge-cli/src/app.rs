//! Bridge application wiring
//!
//! Builds the configured publisher, then drives one session through
//! connect, login, listen and disconnect.

use std::sync::Arc;

use ami_bridge_amqp::BrokerPublisher;
use ami_bridge_runtime::{
    CancellationToken, ConsolePublisher, Dialer, Publisher, Session, SessionConfig, TcpDialer,
};
use tracing::{debug, error, info};

use crate::config::{AppConfig, PublisherKind};
use crate::error::Result;

/// The bridge process: one configuration, one session
pub struct BridgeApp {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl BridgeApp {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Token that stops the session when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the switch connection ends or shutdown is requested
    pub async fn run(self) -> Result<()> {
        let session_config = self.config.to_session_config()?;

        match self.config.publisher {
            PublisherKind::Console => {
                let publisher = Arc::new(ConsolePublisher::stdout());
                run_session(session_config, TcpDialer, publisher, self.shutdown).await
            }
            PublisherKind::Amqp => {
                let publisher = Arc::new(BrokerPublisher::new(&session_config));
                run_session(session_config, TcpDialer, publisher, self.shutdown).await
            }
        }
    }
}

/// Drive one session end to end
///
/// Teardown always runs. A connect or listen error after shutdown was requested
/// is not a failure.
pub async fn run_session<D: Dialer, P: Publisher>(
    config: SessionConfig,
    dialer: D,
    publisher: Arc<P>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut session = Session::new(config, dialer, publisher).with_shutdown_token(shutdown.clone());

    info!("Connecting to AMI");
    if let Err(e) = session.connect().await {
        session.disconnect().await;
        if shutdown.is_cancelled() {
            info!("Shutdown requested before the session was established");
            return Ok(());
        }
        error!("Failed to connect to Asterisk: {}", e);
        return Err(e.into());
    }

    info!("Logging in to AMI");
    let outcome = match session.login().await {
        Ok(()) => {
            info!("Login successful");
            match session.listen().await {
                Ok(()) => Ok(()),
                Err(e) if shutdown.is_cancelled() => {
                    debug!("Listen ended during shutdown: {}", e);
                    Ok(())
                }
                Err(e) => {
                    error!("Error listening for events: {}", e);
                    Err(e)
                }
            }
        }
        Err(e) => {
            error!("Failed to login to Asterisk: {}", e);
            Err(e)
        }
    };

    session.disconnect().await;
    outcome.map_err(Into::into)
}
