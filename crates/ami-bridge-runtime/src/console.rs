//! Console publisher
//!
//! Writes each event as one JSON object per line. Stdout by default; any
//! `io::Write` sink can be supplied instead.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use ami_bridge_core::{Message, PublishError, Publisher};
use async_trait::async_trait;
use tracing::warn;

/// Publisher that prints events as JSON lines
pub struct ConsolePublisher {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl ConsolePublisher {
    pub fn new<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            sink: Mutex::new(Box::new(sink)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    fn lock_sink(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConsolePublisher {
    fn default() -> Self {
        Self::stdout()
    }
}

#[async_trait]
impl Publisher for ConsolePublisher {
    async fn initialize(&self) -> Result<(), PublishError> {
        Ok(())
    }

    async fn consume(&self, event: Message) {
        let line = match event.to_json() {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize event: {}", e);
                return;
            }
        };

        let mut sink = self.lock_sink();
        if let Err(e) = writeln!(sink, "{}", line).and_then(|_| sink.flush()) {
            warn!("Failed to write event to console: {}", e);
        }
    }

    async fn destroy(&self) {
        if let Err(e) = self.lock_sink().flush() {
            warn!("Failed to flush console output: {}", e);
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_events_written_as_json_lines() {
        let buffer = SharedBuffer::default();
        let publisher = ConsolePublisher::new(buffer.clone());
        publisher.initialize().await.unwrap();

        publisher
            .consume(Message::new().with_field("Event", "Hangup").with_field("Cause", "16"))
            .await;
        publisher
            .consume(Message::new().with_field("Event", "Newstate"))
            .await;
        publisher.destroy().await;

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["Event"], "Hangup");
        assert_eq!(first["Cause"], "16");
        assert_eq!(publisher.name(), "console");
    }
}
