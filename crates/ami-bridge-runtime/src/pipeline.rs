//! Event pipeline
//!
//! A bounded MPMC queue drained by a fixed pool of workers, each handing events to
//! the shared publisher. `submit` waits while the queue is full, which pushes
//! backpressure onto the listen loop and from there onto the switch connection.

use std::sync::Arc;

use ami_bridge_core::{Message, Publisher};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::PipelineError;

/// Bounded queue plus the workers draining it
pub struct EventPipeline {
    sender: Sender<Message>,
    workers: Vec<JoinHandle<()>>,
}

impl EventPipeline {
    /// Create the queue and spawn `worker_count` workers on the current runtime
    pub fn start<P: Publisher>(
        publisher: Arc<P>,
        worker_count: usize,
        capacity: usize,
    ) -> Result<Self, PipelineError> {
        if worker_count == 0 || capacity == 0 {
            return Err(PipelineError::InvalidSize);
        }

        let (sender, receiver) = async_channel::bounded(capacity);
        let workers = (1..=worker_count)
            .map(|id| tokio::spawn(run_worker(id, receiver.clone(), Arc::clone(&publisher))))
            .collect();

        info!(
            "Event pipeline started: {} workers, queue capacity {}, publisher {}",
            worker_count,
            capacity,
            publisher.name()
        );

        Ok(Self { sender, workers })
    }

    /// Enqueue one event, waiting while the queue is full
    pub async fn submit(&self, event: Message) -> Result<(), PipelineError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Events currently waiting for a worker
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(0)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Close the queue and wait for every worker to finish
    ///
    /// Workers drain whatever is still queued before exiting. Further `submit`
    /// calls fail with `PipelineError::Closed`.
    pub async fn shutdown(&mut self) -> Result<(), PipelineError> {
        self.sender.close();
        debug!(
            "Event queue closed with {} events pending",
            self.sender.len()
        );

        let mut result = Ok(());
        for (index, handle) in self.workers.drain(..).enumerate() {
            if let Err(e) = handle.await {
                let id = index + 1;
                error!("Pipeline worker {} failed: {}", id, e);
                result = Err(PipelineError::WorkerFailed { id });
            }
        }

        info!("Event pipeline stopped");
        result
    }
}

impl Drop for EventPipeline {
    fn drop(&mut self) {
        self.sender.close();
    }
}

async fn run_worker<P: Publisher>(id: usize, receiver: Receiver<Message>, publisher: Arc<P>) {
    debug!("Pipeline worker {} started", id);
    while let Ok(event) = receiver.recv().await {
        publisher.consume(event).await;
    }
    debug!("Pipeline worker {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ami_bridge_core::PublishError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, Semaphore};

    struct GatedPublisher {
        gate: Semaphore,
        started: mpsc::UnboundedSender<()>,
        consumed: AtomicUsize,
    }

    #[async_trait]
    impl Publisher for GatedPublisher {
        async fn initialize(&self) -> Result<(), PublishError> {
            Ok(())
        }

        async fn consume(&self, _event: Message) {
            let _ = self.started.send(());
            self.gate.acquire().await.unwrap().forget();
            self.consumed.fetch_add(1, Ordering::SeqCst);
        }

        async fn destroy(&self) {}

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    fn create_test_event(n: usize) -> Message {
        Message::new()
            .with_field("Event", "Newchannel")
            .with_field("Uniqueid", n.to_string())
    }

    fn create_gated_publisher() -> (Arc<GatedPublisher>, mpsc::UnboundedReceiver<()>) {
        let (started, started_rx) = mpsc::unbounded_channel();
        let publisher = Arc::new(GatedPublisher {
            gate: Semaphore::new(0),
            started,
            consumed: AtomicUsize::new(0),
        });
        (publisher, started_rx)
    }

    #[tokio::test]
    async fn test_invalid_sizes_rejected() {
        let (publisher, _rx) = create_gated_publisher();
        assert!(matches!(
            EventPipeline::start(publisher.clone(), 0, 4),
            Err(PipelineError::InvalidSize)
        ));
        assert!(matches!(
            EventPipeline::start(publisher, 2, 0),
            Err(PipelineError::InvalidSize)
        ));
    }

    #[tokio::test]
    async fn test_submit_blocks_when_queue_full() {
        let (publisher, mut started) = create_gated_publisher();
        let mut pipeline = EventPipeline::start(publisher.clone(), 1, 1).unwrap();
        assert_eq!(pipeline.capacity(), 1);

        // The single worker takes the first event and parks on the gate
        pipeline.submit(create_test_event(1)).await.unwrap();
        started.recv().await.unwrap();

        // The second fills the queue
        pipeline.submit(create_test_event(2)).await.unwrap();
        assert_eq!(pipeline.queued(), 1);

        // The third cannot be accepted until a worker frees a slot
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            pipeline.submit(create_test_event(3)),
        )
        .await;
        assert!(blocked.is_err());

        publisher.gate.add_permits(10);
        pipeline.shutdown().await.unwrap();
        assert_eq!(publisher.consumed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_and_rejects_submit() {
        let (publisher, _started) = create_gated_publisher();
        publisher.gate.add_permits(100);

        let mut pipeline = EventPipeline::start(publisher.clone(), 4, 16).unwrap();
        assert_eq!(pipeline.worker_count(), 4);
        for n in 0..16 {
            pipeline.submit(create_test_event(n)).await.unwrap();
        }

        pipeline.shutdown().await.unwrap();
        assert_eq!(publisher.consumed.load(Ordering::SeqCst), 16);
        assert!(pipeline.is_closed());
        assert!(matches!(
            pipeline.submit(create_test_event(99)).await,
            Err(PipelineError::Closed)
        ));
    }
}
