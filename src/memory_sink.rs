use crate::record::EmittedRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use tokio::sync::mpsc;

/// A sink that forwards every record into an in-process channel.
///
/// Handy for embedding the records elsewhere (an admin endpoint, a test
/// assertion) without going through any I/O.
#[derive(Clone)]
pub struct MemorySink {
    sender: mpsc::UnboundedSender<EmittedRecord>,
}

impl MemorySink {
    /// Create the sink together with the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmittedRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl LogSink for MemorySink {
    async fn send(&self, record: &EmittedRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.sender
            .send(record.clone())
            .map_err(|_| "memory sink receiver dropped".into())
    }
}
