//! Switch connection management
//!
//! `ConnectionManager` owns the TCP (or test) stream to the manager interface. It
//! dials with a bounded number of attempts, splits the stream into a framed reader
//! and writer sharing `AmiCodec`, and exposes deadline-bounded reads for the
//! session's listen loop.

use std::io;
use std::time::Duration;

use ami_bridge_core::{AmiCodec, Message, ReadError, SessionConfig};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};

/// Pause between failed dial attempts
pub const DIAL_BACKOFF: Duration = Duration::from_secs(1);

// ----------------------------------------------------------------------------
// Dialing
// ----------------------------------------------------------------------------

/// Opens byte streams to the switch
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Open one stream; a zero `dial_timeout` waits indefinitely
    async fn dial(&self, address: &str, dial_timeout: Duration) -> io::Result<Self::Stream>;
}

/// Plain TCP dialer used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, address: &str, dial_timeout: Duration) -> io::Result<TcpStream> {
        if dial_timeout.is_zero() {
            return TcpStream::connect(address).await;
        }

        match timeout(dial_timeout, TcpStream::connect(address)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("dial timed out after {:?}", dial_timeout),
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Manager
// ----------------------------------------------------------------------------

/// Counters for dial activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Dial attempts made, successful or not
    pub dial_attempts: u32,
    /// Attempts that failed and were followed by another attempt
    pub retries: u32,
    /// Dials that produced a stream
    pub connections: u32,
}

type Reader<S> = FramedRead<ReadHalf<S>, AmiCodec>;
type Writer<S> = FramedWrite<WriteHalf<S>, AmiCodec>;

/// Owns the framed transport to the switch
pub struct ConnectionManager<D: Dialer> {
    dialer: D,
    address: String,
    dial_timeout: Duration,
    dial_retry: u32,
    reader: Option<Reader<D::Stream>>,
    writer: Option<Writer<D::Stream>>,
    stats: ConnectionStats,
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(dialer: D, config: &SessionConfig) -> Self {
        Self {
            dialer,
            address: config.address(),
            dial_timeout: config.dial_timeout,
            dial_retry: config.dial_retry,
            reader: None,
            writer: None,
            stats: ConnectionStats::default(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub fn is_connected(&self) -> bool {
        self.writer.is_some() && self.reader.is_some()
    }

    /// Dial the switch, retrying up to the configured number of attempts
    ///
    /// A retry count of zero still makes one attempt. Failed attempts are followed
    /// by a fixed `DIAL_BACKOFF` pause, except the last one. Cancelling `shutdown`
    /// abandons a pending dial or pause with `SessionError::Cancelled`.
    pub async fn connect(&mut self, shutdown: &CancellationToken) -> Result<()> {
        if self.is_connected() {
            return Err(SessionError::InvalidState("connection is already open"));
        }

        let attempts = self.dial_retry.max(1);
        let mut attempt = 1;

        loop {
            debug!(
                "Dialing {} (attempt {}/{})",
                self.address, attempt, attempts
            );
            self.stats.dial_attempts += 1;

            let dialed = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Dialing {} cancelled", self.address);
                    return Err(SessionError::Cancelled);
                }
                dialed = self.dialer.dial(&self.address, self.dial_timeout) => dialed,
            };

            match dialed {
                Ok(stream) => {
                    let (read_half, write_half) = tokio::io::split(stream);
                    self.reader = Some(FramedRead::new(read_half, AmiCodec::new()));
                    self.writer = Some(FramedWrite::new(write_half, AmiCodec::new()));
                    self.stats.connections += 1;
                    info!("Connected to {}", self.address);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "[Retry {}] Failed to connect to {}: {}",
                        attempt, self.address, e
                    );
                    self.stats.retries += 1;
                    attempt += 1;
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            info!("Dialing {} cancelled", self.address);
                            return Err(SessionError::Cancelled);
                        }
                        _ = sleep(DIAL_BACKOFF) => {}
                    }
                }
                Err(e) => {
                    return Err(SessionError::Connection {
                        address: self.address.clone(),
                        attempts,
                        source: e,
                    });
                }
            }
        }
    }

    /// Serialize and flush one message
    pub async fn send(&mut self, message: Message) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or(SessionError::InvalidState("connection is not open"))?;
        writer.send(message).await.map_err(SessionError::Write)
    }

    /// Read the next complete message, waiting at most `deadline`
    ///
    /// Cancel-safe: bytes of a partially received message stay buffered in the codec
    /// and are completed by the next call.
    pub async fn read_message(&mut self, deadline: Duration) -> std::result::Result<Message, ReadError> {
        let reader = self.reader.as_mut().ok_or(ReadError::Closed)?;

        match timeout(deadline, reader.next()).await {
            Err(_) => Err(ReadError::Timeout(deadline)),
            Ok(None) => Err(ReadError::Closed),
            Ok(Some(Ok(message))) => Ok(message),
            Ok(Some(Err(e))) => Err(ReadError::Io(e)),
        }
    }

    /// Flush and shut down the write side, then drop both halves
    ///
    /// Closing a connection that is not open is a no-op.
    pub async fn close(&mut self) -> io::Result<()> {
        self.reader.take();
        match self.writer.take() {
            Some(mut writer) => {
                let result = writer.close().await;
                info!("Connection to {} closed", self.address);
                result
            }
            None => Ok(()),
        }
    }
}
