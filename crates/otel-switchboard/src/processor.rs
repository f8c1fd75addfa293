//! Batching and periodic export.
//!
//! A [`BatchProcessor`] sits between the recording API and a signal's
//! [`SinkShim`]. It is created once per signal and never recreated across
//! connection changes - only the sink behind the shim changes - which is
//! why data already enqueued survives a destination swap.

use crate::shim::SinkShim;
use crate::sink::{SignalBatch, SinkError};
use otel_switchboard_config::QueueConfig;
use prost::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Queue and scheduling limits for one processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Maximum entries per exported batch.
    pub max_batch_entries: usize,
    /// Maximum encoded bytes per exported batch.
    pub max_batch_bytes: usize,
    /// Maximum entries queued before the oldest are dropped.
    pub max_queue_entries: usize,
    /// Maximum encoded bytes queued before the oldest are dropped.
    pub max_queue_bytes: usize,
    /// Interval between periodic flushes.
    pub export_interval: Duration,
}

impl ProcessorConfig {
    /// Builds a processor config from shared queue limits and a per-signal
    /// export interval.
    pub fn from_queue(queue: &QueueConfig, export_interval: Duration) -> Self {
        Self {
            max_batch_entries: queue.max_batch_entries,
            max_batch_bytes: queue.max_batch_bytes,
            max_queue_entries: queue.max_queue_entries,
            max_queue_bytes: queue.max_queue_bytes,
            export_interval,
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_queue(&QueueConfig::default(), Duration::from_secs(30))
    }
}

/// Bounded queue for one signal's pending items.
struct SignalQueue<T> {
    items: VecDeque<T>,
    max_batch_entries: usize,
    max_batch_bytes: usize,
    max_queue_entries: usize,
    max_queue_bytes: usize,
    current_bytes: usize,
    dropped_count: u64,
}

impl<T: Message> SignalQueue<T> {
    fn new(config: &ProcessorConfig) -> Self {
        Self {
            items: VecDeque::new(),
            max_batch_entries: config.max_batch_entries,
            max_batch_bytes: config.max_batch_bytes,
            max_queue_entries: config.max_queue_entries,
            max_queue_bytes: config.max_queue_bytes,
            current_bytes: 0,
            dropped_count: 0,
        }
    }

    fn push(&mut self, item: T) {
        let item_size = item.encoded_len();

        // Drop oldest items if the queue is full.
        while !self.items.is_empty()
            && (self.items.len() >= self.max_queue_entries
                || self.current_bytes + item_size > self.max_queue_bytes)
        {
            if let Some(dropped) = self.items.pop_front() {
                self.current_bytes = self.current_bytes.saturating_sub(dropped.encoded_len());
                self.dropped_count += 1;
            }
        }

        self.current_bytes += item_size;
        self.items.push_back(item);
    }

    fn take_batch(&mut self) -> Vec<T> {
        let mut batch = Vec::new();
        let mut batch_size = 0;

        while let Some(item) = self.items.pop_front() {
            let item_size = item.encoded_len();

            if !batch.is_empty()
                && (batch_size + item_size > self.max_batch_bytes
                    || batch.len() >= self.max_batch_entries)
            {
                self.items.push_front(item);
                break;
            }

            self.current_bytes = self.current_bytes.saturating_sub(item_size);
            batch.push(item);
            batch_size += item_size;
        }

        batch
    }
}

/// Persistent batching layer above a signal's shim.
pub struct BatchProcessor<T: SignalBatch> {
    queue: Mutex<SignalQueue<T>>,
    shim: Arc<SinkShim<T>>,
    cancel: CancellationToken,
    export_interval: Duration,
}

impl<T: SignalBatch> BatchProcessor<T> {
    /// Creates a processor feeding the given shim.
    pub fn new(config: ProcessorConfig, shim: Arc<SinkShim<T>>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(SignalQueue::new(&config)),
            shim,
            cancel: CancellationToken::new(),
            export_interval: config.export_interval,
        })
    }

    /// Spawns the periodic flush loop for a processor.
    ///
    /// The loop runs until [`shutdown`](Self::shutdown) cancels it or the
    /// processor is dropped. Flush failures are logged, never propagated.
    pub fn spawn_flush_loop(this: &Arc<Self>) -> JoinHandle<()> {
        // The loop holds only a weak handle: dropping the last owner must
        // stop the loop, not the other way around.
        let weak = Arc::downgrade(this);
        let cancel = this.cancel.clone();
        let interval = this.export_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so the loop
            // starts with a full interval of quiet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(processor) = weak.upgrade() else { break };
                        if let Err(e) = processor.force_flush().await {
                            tracing::warn!(
                                signal = %T::SIGNAL,
                                error = %e,
                                "periodic flush failed, dropping batch"
                            );
                        }
                    }
                }
            }
        })
    }

    /// Enqueues one item for the next flush. Non-blocking; when the queue
    /// is full the oldest items are dropped and counted.
    pub fn enqueue(&self, item: T) {
        self.queue.lock().expect("queue poisoned").push(item);
    }

    /// Number of items waiting to be exported.
    pub fn pending(&self) -> usize {
        self.queue.lock().expect("queue poisoned").items.len()
    }

    /// Number of items dropped to queue limits so far.
    pub fn dropped(&self) -> u64 {
        self.queue.lock().expect("queue poisoned").dropped_count
    }

    /// Drains the queue through the shim, one size-capped batch at a time.
    ///
    /// # Errors
    ///
    /// Returns the first export error. The failed batch is dropped (the
    /// core does not retry); items not yet taken stay queued for the next
    /// flush.
    pub async fn force_flush(&self) -> Result<(), SinkError> {
        loop {
            let items = self.queue.lock().expect("queue poisoned").take_batch();
            if items.is_empty() {
                return Ok(());
            }

            let mut merged = T::default();
            for item in items {
                SignalBatch::merge(&mut merged, item);
            }

            self.shim.export(merged).await?;
        }
    }

    /// Stops the flush loop, drains once more, and shuts the shim down.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; the remaining steps still run.
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        self.cancel.cancel();

        let flushed = self.force_flush().await;
        let shut = self.shim.shutdown().await;

        flushed.and(shut)
    }

    /// The shim this processor exports through.
    pub fn shim(&self) -> &Arc<SinkShim<T>> {
        &self.shim
    }
}

impl<T: SignalBatch> Drop for BatchProcessor<T> {
    fn drop(&mut self) {
        // Stops the flush loop if the owner never called shutdown.
        self.cancel.cancel();
    }
}
