use crate::record::EmittedRecord;
use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;
use tokio::io::AsyncWriteExt;

/// Writes each record to stdout as one line.
///
/// The line follows the core's log pattern when one is set, JSON otherwise
/// (see [`EmittedRecord::render`]).
#[derive(Clone, Default)]
pub struct ConsoleSink;

#[async_trait]
impl LogSink for ConsoleSink {
    async fn send(&self, record: &EmittedRecord) -> Result<(), Box<dyn Error + Send + Sync>> {
        let mut line = record.render();
        line.push('\n');
        tokio::io::stdout().write_all(line.as_bytes()).await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        tokio::io::stdout().flush().await?;
        Ok(())
    }
}
