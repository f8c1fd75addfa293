//! Instrumented sink doubles shared by the unit tests.

use crate::sink::{SignalSink, SinkError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Observable state of a [`RecordingSink`].
pub(crate) struct SinkProbe<T> {
    exports: Mutex<Vec<T>>,
    flush_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    fail_exports: AtomicBool,
    fail_shutdown: AtomicBool,
    /// When gated, each export body must be released with [`release_one`].
    gate: Option<Semaphore>,
}

impl<T> SinkProbe<T> {
    pub fn exports(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.exports.lock().unwrap().clone()
    }

    pub fn export_count(&self) -> usize {
        self.exports.lock().unwrap().len()
    }

    pub fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Largest number of sink bodies ever observed running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn fail_exports(&self, fail: bool) {
        self.fail_exports.store(fail, Ordering::SeqCst);
    }

    pub fn fail_shutdown(&self, fail: bool) {
        self.fail_shutdown.store(fail, Ordering::SeqCst);
    }

    /// Lets one gated export body complete.
    pub fn release_one(&self) {
        self.gate
            .as_ref()
            .expect("sink is not gated")
            .add_permits(1);
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A sink that records everything that happens to it.
pub(crate) struct RecordingSink<T> {
    probe: Arc<SinkProbe<T>>,
}

impl<T> RecordingSink<T> {
    /// Creates a sink whose operations complete immediately.
    pub fn new() -> (Self, Arc<SinkProbe<T>>) {
        Self::build(None)
    }

    /// Creates a sink whose export bodies suspend until released through
    /// the probe.
    pub fn gated() -> (Self, Arc<SinkProbe<T>>) {
        Self::build(Some(Semaphore::new(0)))
    }

    fn build(gate: Option<Semaphore>) -> (Self, Arc<SinkProbe<T>>) {
        let probe = Arc::new(SinkProbe {
            exports: Mutex::new(Vec::new()),
            flush_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            fail_exports: AtomicBool::new(false),
            fail_shutdown: AtomicBool::new(false),
            gate,
        });
        (
            Self {
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> SignalSink<T> for RecordingSink<T> {
    async fn export(&self, batch: T) -> Result<(), SinkError> {
        self.probe.enter();

        if let Some(gate) = &self.probe.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let result = if self.probe.fail_exports.load(Ordering::SeqCst) {
            Err(SinkError::status(503, "injected failure"))
        } else {
            self.probe.exports.lock().unwrap().push(batch);
            Ok(())
        };

        self.probe.exit();
        result
    }

    async fn force_flush(&self) -> Result<(), SinkError> {
        self.probe.enter();
        tokio::task::yield_now().await;
        self.probe.flush_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.exit();
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SinkError> {
        self.probe.enter();
        tokio::task::yield_now().await;
        self.probe.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.exit();

        if self.probe.fail_shutdown.load(Ordering::SeqCst) {
            Err(SinkError::status(500, "injected shutdown failure"))
        } else {
            Ok(())
        }
    }
}
