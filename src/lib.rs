pub mod context;
pub mod descriptor;
pub mod record;
pub mod resolve;
pub mod pipeline;

pub mod logger;
pub mod dispatch;
pub mod error;
pub mod layer;
pub mod sink;

#[cfg(feature = "console")]
pub mod console;

pub mod defaults;
pub mod env;
pub mod init;
pub mod memory_sink;
pub mod middleware;
pub mod noop_sink;

pub use crate::logger::{LoggingCore, RequestLogger};
pub use descriptor::{FieldConfig, FieldDescriptor, FieldFn, Source};
pub use pipeline::{PendingExchange, Pipeline};
pub use record::{EmittedRecord, LogRecord};
