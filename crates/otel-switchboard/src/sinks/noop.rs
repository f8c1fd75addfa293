//! No-op sink for the `devnull:` scheme.

use crate::sink::{SignalBatch, SignalSink, SinkError};
use async_trait::async_trait;

/// Accepts and discards everything.
pub struct NoopSink;

#[async_trait]
impl<T: SignalBatch> SignalSink<T> for NoopSink {
    async fn export(&self, _batch: T) -> Result<(), SinkError> {
        Ok(())
    }

    async fn force_flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
