//! The two-phase pipeline.
//!
//! A request moves through `Created → PreResolved → AwaitingCompletion →
//! PostResolved → Emitted`. The states are carried by types rather than a
//! flag: [`Pipeline::begin`] returns a [`PendingExchange`] holding the
//! pre-resolved record, and [`PendingExchange::finish`] /
//! [`PendingExchange::complete`] consume it. The post pass therefore runs at
//! most once per request, however often a host reports completion.

use std::sync::Arc;

use crate::context::{ContextView, EmptyContext, HostContext};
use crate::logger::{LoggingCore, RequestLogger};
use crate::descriptor::FieldConfig;
use crate::record::LogRecord;
use crate::resolve::{Phase, ResolutionPass};

/// Field configuration bound to a logging core.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<FieldConfig>,
    core: Arc<LoggingCore>,
}

impl Pipeline {
    pub fn new(config: FieldConfig, core: Arc<LoggingCore>) -> Self {
        Self::with_shared_config(Arc::new(config), core)
    }

    pub fn with_shared_config(config: Arc<FieldConfig>, core: Arc<LoggingCore>) -> Self {
        Self { config, core }
    }

    /// Run the pre pass for an arriving request.
    ///
    /// No response exists yet, so response reads see an [`EmptyContext`].
    pub fn begin<R: HostContext>(&self, request: R) -> PendingExchange<R> {
        let mut record = self.core.init_log();
        ResolutionPass::new(Phase::Pre, &self.config.pre).run(
            &ContextView::new(&request),
            &ContextView::new(&EmptyContext),
            &mut record,
        );

        PendingExchange {
            config: Arc::clone(&self.config),
            core: Arc::clone(&self.core),
            request,
            record,
        }
    }
}

/// A request whose pre pass is done and whose response is still pending.
pub struct PendingExchange<R> {
    config: Arc<FieldConfig>,
    core: Arc<LoggingCore>,
    request: R,
    record: LogRecord,
}

impl<R: HostContext> PendingExchange<R> {
    pub fn record(&self) -> &LogRecord {
        &self.record
    }

    /// Logging helpers carrying this request's correlation id.
    pub fn bind(&self) -> RequestLogger {
        self.core.bind_log_functions(&self.record)
    }

    /// Run the post pass and return the finished record without emitting it.
    pub fn finish(self, response: &dyn HostContext) -> LogRecord {
        let Self {
            config,
            request,
            mut record,
            ..
        } = self;

        ResolutionPass::new(Phase::Post, &config.post).run(
            &ContextView::new(&request),
            &ContextView::new(response),
            &mut record,
        );
        record
    }

    /// Run the post pass and emit the record through the core.
    pub fn complete(self, response: &dyn HostContext) {
        let core = Arc::clone(&self.core);
        core.emit(self.finish(response));
    }
}

impl<R> std::fmt::Debug for PendingExchange<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingExchange")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}
