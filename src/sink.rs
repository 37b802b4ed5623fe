use crate::record::EmittedRecord;
use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for [`EmittedRecord`]s produced by the logging core.
///
/// Implementations are responsible for transporting records to a concrete
/// backend (stdout, a file, a collector). The core hands records to a
/// background dispatcher, so `send` is never awaited on a request path.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send a single finished record to the underlying backend.
    ///
    /// **Parameters**
    /// - `record`: network or message record, already carrying static
    ///   overrides and its severity level.
    ///
    /// **Returns**
    /// - `Ok(())` if the record was accepted by the backend.
    /// - `Err(..)` if the backend failed. The dispatcher treats this as a
    ///   transient failure and retries the batch with backoff.
    async fn send(&self, record: &EmittedRecord) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered records, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
