use crate::error::DispatchError;
use crate::record::EmittedRecord;
use crate::sink::LogSink;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::warn;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 5;

/// Counters kept by a [`Dispatcher`].
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Records handed to the dispatcher.
    pub total: AtomicU64,
    /// Successfully enqueued into the channel.
    pub enqueued: AtomicU64,
    /// Dropped because the channel was full or closed, or the sink kept failing.
    pub dropped: AtomicU64,
    /// Accepted by the sink.
    pub delivered: AtomicU64,
}

impl DispatchStats {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Hands emitted records to a [`LogSink`] through a bounded channel and a
/// background task, so request handling never waits on log I/O.
///
/// Records are delivered in batches, either when `batch_size` records are
/// waiting or on the next `flush_interval` tick. Once the dispatcher is
/// closed or dropped the task delivers what is left, flushes the sink and
/// exits.
pub struct Dispatcher {
    sender: RwLock<Option<mpsc::Sender<EmittedRecord>>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Create a dispatcher and spawn its delivery task.
    ///
    /// Must be called from within a Tokio runtime. Minimal thresholds are
    /// enforced for `buffer`, `batch_size` and `flush_interval`.
    pub fn new(
        sink: Arc<dyn LogSink>,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<EmittedRecord>(buffer);
        let stats = Arc::new(DispatchStats::default());
        let stats_bg = Arc::clone(&stats);

        let handle = tokio::spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(record) => {
                            batch.push(record);
                            if batch.len() >= batch_size {
                                send_batch(&*sink, &mut batch, &stats_bg).await;
                            }
                        }
                        None => {
                            if !batch.is_empty() {
                                send_batch(&*sink, &mut batch, &stats_bg).await;
                            }
                            if let Err(e) = sink.flush().await {
                                warn!(error = %e, "log sink flush failed");
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            send_batch(&*sink, &mut batch, &stats_bg).await;
                        }
                    }
                }
            }
        });

        let dispatcher = Self {
            sender: RwLock::new(Some(tx)),
            stats,
        };
        (dispatcher, handle)
    }

    /// Queue a record without waiting.
    pub fn dispatch(&self, record: EmittedRecord) -> Result<(), DispatchError> {
        self.stats.total.fetch_add(1, Ordering::Relaxed);
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(DispatchError::Closed);
        };
        match sender.try_send(record) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DispatchError::ChannelFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DispatchError::Closed)
            }
        }
    }

    /// Stop accepting records. The delivery task drains the channel and
    /// exits; later dispatches fail with [`DispatchError::Closed`].
    pub fn close(&self) {
        self.sender.write().take();
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }
}

async fn send_batch(sink: &dyn LogSink, batch: &mut Vec<EmittedRecord>, stats: &DispatchStats) {
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        let mut sent = 0;
        let mut failure = None;
        for record in batch.iter() {
            match sink.send(record).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        // Records the sink already accepted are never sent twice.
        batch.drain(..sent);
        stats.delivered.fetch_add(sent as u64, Ordering::Relaxed);

        let Some(e) = failure else {
            return;
        };
        if attempt < MAX_ATTEMPTS {
            warn!(error = %e, attempt, backoff = ?backoff, "log sink send failed, retrying");
            sleep(backoff).await;
            backoff = std::cmp::min(backoff * 2, MAX_BACKOFF);
        }
    }

    warn!(dropped = batch.len(), "log sink kept failing, dropping batch");
    stats.dropped.fetch_add(batch.len() as u64, Ordering::Relaxed);
    batch.clear();
}
