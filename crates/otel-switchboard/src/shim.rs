//! The sink shim: a stable facade over one replaceable sink.
//!
//! A [`SinkShim`] exclusively owns the signal's current sink and serialises
//! every operation on it through one [`HandoffMutex`]. Because export,
//! flush, shutdown, and swap all run under the same lock, no caller can
//! observe a sink mid-replacement: an export issued before a swap either
//! completes against the old sink or queues behind the swap and runs
//! against the new one - never both, never neither.
//!
//! The one intentionally-unsynchronised read is the shutdown fast path in
//! [`export`](SinkShim::export): it may be stale when a shutdown completes
//! concurrently, but staleness only ever costs one extra attempted export
//! against a sink that is about to be retired.

use crate::sink::{SignalSink, SinkError};
use crate::sync::HandoffMutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Mutex-guarded facade over one replaceable [`SignalSink`].
///
/// Created once per signal when its connection is set up; only the sink
/// *behind* it is ever replaced, which is what lets the batching layer
/// above keep a stable handle across connection changes.
pub struct SinkShim<T> {
    current: HandoffMutex<Box<dyn SignalSink<T>>>,
    is_shutdown: AtomicBool,
}

impl<T: Send + 'static> SinkShim<T> {
    /// Creates a shim bound to an initial sink.
    pub fn new(sink: Box<dyn SignalSink<T>>) -> Self {
        Self {
            current: HandoffMutex::new(sink),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Whether the shim has been shut down.
    ///
    /// This reads the flag outside the lock and may be stale under
    /// concurrent shutdown.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Forwards a batch to the current sink.
    ///
    /// After shutdown this fails fast with [`SinkError::ShutDown`] without
    /// touching the lock or the defunct sink.
    ///
    /// # Errors
    ///
    /// Returns the sink's error verbatim; the shim itself never panics.
    pub async fn export(&self, batch: T) -> Result<(), SinkError> {
        if self.is_shutdown() {
            return Err(SinkError::ShutDown);
        }

        let sink = self.current.lock().await;
        sink.export(batch).await
    }

    /// Drains the current sink's internal buffers; best-effort.
    ///
    /// A shim that is already shut down has nothing to drain and resolves
    /// immediately with success.
    ///
    /// # Errors
    ///
    /// Returns the sink's flush error, if any.
    pub async fn force_flush(&self) -> Result<(), SinkError> {
        if self.is_shutdown() {
            return Ok(());
        }

        let sink = self.current.lock().await;
        sink.force_flush().await
    }

    /// Shuts down the current sink and marks the shim defunct.
    ///
    /// Idempotent: only the first successful call reaches the sink; later
    /// calls resolve immediately. If the sink's own shutdown fails, the
    /// error is returned and the shim stays live, so a caller may retry or
    /// swap in a replacement.
    ///
    /// # Errors
    ///
    /// Returns the sink's shutdown error, if any.
    pub async fn shutdown(&self) -> Result<(), SinkError> {
        if self.is_shutdown() {
            return Ok(());
        }

        let sink = self.current.lock().await;
        // A concurrent shutdown may have won the lock first.
        if self.is_shutdown() {
            return Ok(());
        }

        sink.shutdown().await?;
        self.is_shutdown.store(true, Ordering::Release);
        Ok(())
    }

    /// Atomically substitutes a new sink, returning the old one.
    ///
    /// The shutdown flag is cleared: a shim may be revived with a fresh
    /// sink even after having been shut down, which is what reconnect-
    /// after-teardown flows rely on.
    ///
    /// The caller owns the returned sink and is expected to shut it down
    /// *outside* this shim's lock, so that a slow teardown of the old
    /// destination never blocks exports against the new one.
    pub async fn swap_exporter(&self, new: Box<dyn SignalSink<T>>) -> Box<dyn SignalSink<T>> {
        self.current
            .run_exclusive(|current| {
                self.is_shutdown.store(false, Ordering::Release);
                std::mem::replace(current, new)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use std::sync::Arc;
    use std::time::Duration;

    type Batch = u32;

    #[tokio::test]
    async fn test_sink_bodies_never_overlap() {
        let (sink, probe) = RecordingSink::<Batch>::new();
        let shim = Arc::new(SinkShim::<Batch>::new(Box::new(sink)));

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let shim = Arc::clone(&shim);
            handles.push(tokio::spawn(async move {
                for j in 0..20 {
                    let _ = shim.export(i * 100 + j).await;
                    let _ = shim.force_flush().await;
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(probe.max_active(), 1);
        assert_eq!(probe.export_count(), 80);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (sink, probe) = RecordingSink::<Batch>::new();
        let shim = SinkShim::<Batch>::new(Box::new(sink));

        shim.shutdown().await.unwrap();
        shim.shutdown().await.unwrap();

        assert_eq!(probe.shutdown_calls(), 1);
    }

    #[tokio::test]
    async fn test_export_fails_fast_after_shutdown() {
        let (sink, probe) = RecordingSink::<Batch>::new();
        let shim = SinkShim::<Batch>::new(Box::new(sink));

        shim.shutdown().await.unwrap();

        let result = shim.export(7).await;
        assert!(matches!(result, Err(SinkError::ShutDown)));
        // The defunct sink was never reached.
        assert_eq!(probe.export_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_after_shutdown_is_a_noop() {
        let (sink, probe) = RecordingSink::<Batch>::new();
        let shim = SinkShim::<Batch>::new(Box::new(sink));

        shim.shutdown().await.unwrap();

        assert!(shim.force_flush().await.is_ok());
        assert_eq!(probe.flush_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_sink_shutdown_leaves_shim_live() {
        let (sink, probe) = RecordingSink::<Batch>::new();
        probe.fail_shutdown(true);
        let shim = SinkShim::<Batch>::new(Box::new(sink));

        assert!(shim.shutdown().await.is_err());
        assert!(!shim.is_shutdown());

        // The shim is still usable; a retry reaches the sink again.
        probe.fail_shutdown(false);
        assert!(shim.shutdown().await.is_ok());
        assert_eq!(probe.shutdown_calls(), 2);
    }

    #[tokio::test]
    async fn test_swap_routes_in_flight_export_to_old_sink() {
        let (old, old_probe) = RecordingSink::<Batch>::gated();
        let (new, new_probe) = RecordingSink::<Batch>::new();
        let shim = Arc::new(SinkShim::<Batch>::new(Box::new(old)));

        // Start an export that suspends inside the old sink's body.
        let exporting = {
            let shim = Arc::clone(&shim);
            tokio::spawn(async move { shim.export(1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The swap queues behind the suspended export.
        let swapping = {
            let shim = Arc::clone(&shim);
            tokio::spawn(async move { shim.swap_exporter(Box::new(new)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(new_probe.export_count(), 0);

        // Complete the suspended export: it was routed at lock-acquisition
        // time, so the old sink receives it.
        old_probe.release_one();
        exporting.await.unwrap().unwrap();
        let _old_sink = swapping.await.unwrap();

        assert_eq!(old_probe.exports(), vec![1]);

        // Everything after the swap lands on the new sink only.
        shim.export(2).await.unwrap();
        assert_eq!(old_probe.exports(), vec![1]);
        assert_eq!(new_probe.exports(), vec![2]);
    }

    #[tokio::test]
    async fn test_swap_returns_the_old_sink() {
        let (old, old_probe) = RecordingSink::<Batch>::new();
        let (new, _) = RecordingSink::<Batch>::new();
        let shim = SinkShim::<Batch>::new(Box::new(old));

        let returned = shim.swap_exporter(Box::new(new)).await;
        returned.shutdown().await.unwrap();

        assert_eq!(old_probe.shutdown_calls(), 1);
    }

    #[tokio::test]
    async fn test_swap_revives_a_shut_down_shim() {
        let (old, _) = RecordingSink::<Batch>::new();
        let (new, new_probe) = RecordingSink::<Batch>::new();
        let shim = SinkShim::<Batch>::new(Box::new(old));

        shim.shutdown().await.unwrap();
        assert!(shim.is_shutdown());

        let _old = shim.swap_exporter(Box::new(new)).await;
        assert!(!shim.is_shutdown());

        shim.export(9).await.unwrap();
        assert_eq!(new_probe.exports(), vec![9]);
    }

    #[tokio::test]
    async fn test_sink_export_failure_is_an_err_not_a_panic() {
        let (sink, probe) = RecordingSink::<Batch>::new();
        probe.fail_exports(true);
        let shim = SinkShim::<Batch>::new(Box::new(sink));

        let result = shim.export(3).await;
        assert!(matches!(result, Err(SinkError::Status { status: 503, .. })));
    }
}
