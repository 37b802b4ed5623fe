use crate::logger::LoggingCore;
use crate::error::InitError;
use crate::layer::MessageLayer;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the logging core.
///
/// **Fields**
/// - `channel_buffer`: maximum number of records waiting for the sink
///   before new ones are dropped.
/// - `batch_size`: number of records delivered to the sink at once.
/// - `flush_interval`: longest time a partial batch waits.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed next to the [`MessageLayer`].
/// - `level`: initial minimum level of emitted records.
/// - `pattern`: initial output pattern (see
///   [`EmittedRecord::render`](crate::record::EmittedRecord::render)).
#[derive(Clone, Debug)]
pub struct CoreConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub enable_stdout: bool,
    pub level: LevelFilter,
    pub pattern: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            enable_stdout: true,
            level: LevelFilter::INFO,
            pattern: None,
        }
    }
}

/// Build a [`LoggingCore`] on `sink` and install the global `tracing`
/// subscriber.
///
/// **Effects**
///
/// Installs a [`Registry`] combined with a [`MessageLayer`] bound to the new
/// core, so application events end up in the sink as message records.
/// Must be called from within a Tokio runtime.
///
/// **Returns**
/// - the shared core, to be handed to the HTTP middleware, and the handle of
///   its delivery task. Call [`LoggingCore::shutdown`] and await the handle
///   to drain pending records before exiting.
/// - `Err(InitError)` if a global subscriber is already set. The core built
///   for the attempt is dropped, so its delivery task exits.
pub fn init_with_config(
    sink: Arc<dyn LogSink>,
    config: CoreConfig,
) -> Result<(Arc<LoggingCore>, JoinHandle<()>), InitError> {
    let (core, handle) = LoggingCore::new(sink, &config);
    let core = Arc::new(core);
    let layer = MessageLayer::new(Arc::clone(&core));

    // The two subscriber shapes have different types, hence two branches.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok((core, handle))
}

/// Initialize with [`CoreConfig::default`].
pub fn init(sink: Arc<dyn LogSink>) -> Result<(Arc<LoggingCore>, JoinHandle<()>), InitError> {
    init_with_config(sink, CoreConfig::default())
}
