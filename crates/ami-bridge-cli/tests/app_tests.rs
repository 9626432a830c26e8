//! End-to-end session runs against an in-memory switch
//!
//! Drives `run_session` the way the binary does, with the TCP dialer swapped for a
//! duplex pipe.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ami_bridge_cli::{run_session, AppConfig, CliError};
use ami_bridge_core::{fields, AmiCodec, Message, PublishError, Publisher, SessionConfig};
use ami_bridge_runtime::{CancellationToken, Dialer, SessionError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::DuplexStream;
use tokio_util::codec::Framed;

// ----------------------------------------------------------------------------
// Test Helpers
// ----------------------------------------------------------------------------

struct PipeDialer {
    client: Mutex<Option<DuplexStream>>,
}

#[async_trait]
impl Dialer for PipeDialer {
    type Stream = DuplexStream;

    async fn dial(&self, _address: &str, _timeout: Duration) -> io::Result<DuplexStream> {
        self.client
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

struct UnreachableDialer;

#[async_trait]
impl Dialer for UnreachableDialer {
    type Stream = DuplexStream;

    async fn dial(&self, _address: &str, _timeout: Duration) -> io::Result<DuplexStream> {
        std::future::pending().await
    }
}

#[derive(Default)]
struct CollectingPublisher {
    events: Mutex<Vec<Message>>,
    destroyed: AtomicUsize,
}

#[async_trait]
impl Publisher for CollectingPublisher {
    async fn initialize(&self) -> Result<(), PublishError> {
        Ok(())
    }

    async fn consume(&self, event: Message) {
        self.events.lock().unwrap().push(event);
    }

    async fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "collecting"
    }
}

fn create_test_session_config() -> SessionConfig {
    let config = AppConfig {
        ami_host: "127.0.0.1".to_string(),
        ami_pass: "s3cret".to_string(),
        host_device_id: "edge-1".to_string(),
        read_timeout: 1,
        number_of_workers: 2,
        number_of_jobs: 4,
        excluded_events: "VarSet".to_string(),
        ..AppConfig::default()
    };
    config.validate().unwrap();
    config.to_session_config().unwrap()
}

fn create_pipe() -> (PipeDialer, Framed<DuplexStream, AmiCodec>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let dialer = PipeDialer {
        client: Mutex::new(Some(client)),
    };
    (dialer, Framed::new(server, AmiCodec::new()))
}

fn event(name: &str) -> Message {
    Message::new().with_field(fields::EVENT, name)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_run_until_shutdown() {
    let (dialer, mut switch) = create_pipe();
    switch
        .send(Message::new().with_field(fields::RESPONSE, "Success"))
        .await
        .unwrap();
    switch.send(event("Newchannel")).await.unwrap();
    switch.send(event("VarSet")).await.unwrap();
    switch.send(event("Hangup")).await.unwrap();

    let publisher = Arc::new(CollectingPublisher::default());
    let shutdown = CancellationToken::new();
    let run = tokio::spawn(run_session(
        create_test_session_config(),
        dialer,
        publisher.clone(),
        shutdown.clone(),
    ));

    let login = switch.next().await.unwrap().unwrap();
    assert_eq!(login.get(fields::ACTION_ID), Some("edge-1 Login"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    run.await.unwrap().unwrap();

    let logoff = switch.next().await.unwrap().unwrap();
    assert_eq!(logoff.get(fields::ACTION), Some("Logoff"));

    let mut names: Vec<String> = publisher
        .events
        .lock()
        .unwrap()
        .iter()
        .map(|e| e.event_name().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["Hangup", "Newchannel"]);
    assert_eq!(publisher.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_loss_is_reported() {
    let (dialer, mut switch) = create_pipe();
    switch
        .send(Message::new().with_field(fields::MESSAGE, "Authentication accepted"))
        .await
        .unwrap();

    let publisher = Arc::new(CollectingPublisher::default());
    let run = tokio::spawn(run_session(
        create_test_session_config(),
        dialer,
        publisher.clone(),
        CancellationToken::new(),
    ));

    switch.next().await.unwrap().unwrap();
    drop(switch);

    let err = run.await.unwrap().unwrap_err();
    assert!(matches!(err, CliError::Session(SessionError::Read(_))));
    assert_eq!(publisher.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_login_tears_down() {
    let (dialer, mut switch) = create_pipe();
    switch
        .send(
            Message::new()
                .with_field(fields::RESPONSE, "Error")
                .with_field(fields::MESSAGE, "Authentication failed"),
        )
        .await
        .unwrap();

    let publisher = Arc::new(CollectingPublisher::default());
    let err = run_session(
        create_test_session_config(),
        dialer,
        publisher.clone(),
        CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        CliError::Session(SessionError::Authentication { .. })
    ));
    assert_eq!(publisher.destroyed.load(Ordering::SeqCst), 1);

    // Login went out, no logoff followed
    assert!(switch.next().await.unwrap().is_ok());
    assert!(switch.next().await.is_none());
}

#[tokio::test]
async fn test_shutdown_while_dialing_exits_cleanly() {
    let publisher = Arc::new(CollectingPublisher::default());
    let shutdown = CancellationToken::new();
    let run = tokio::spawn(run_session(
        create_test_session_config(),
        UnreachableDialer,
        publisher.clone(),
        shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("run_session ignored shutdown while dialing");
    outcome.unwrap().unwrap();
    assert!(publisher.events.lock().unwrap().is_empty());
    assert_eq!(publisher.destroyed.load(Ordering::SeqCst), 0);
}
