//! Publisher capability
//!
//! Publishers are the downstream end of the bridge. The runtime calls `initialize`
//! once after the switch connection is up, `consume` concurrently from every pipeline
//! worker, and `destroy` once during teardown after the workers have drained.

use async_trait::async_trait;

use crate::errors::PublishError;
use crate::message::Message;

/// Downstream sink for enriched events
///
/// Implementations must tolerate concurrent `consume` calls; they are shared between
/// workers behind an `Arc`.
#[async_trait]
pub trait Publisher: Send + Sync + 'static {
    /// Acquire downstream resources (files, broker connections)
    async fn initialize(&self) -> Result<(), PublishError>;

    /// Publish one event; failures are handled internally
    async fn consume(&self, event: Message);

    /// Release downstream resources, best-effort
    async fn destroy(&self);

    /// Short name used in log lines
    fn name(&self) -> &'static str;
}
