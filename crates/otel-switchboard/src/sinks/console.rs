//! Human-readable debug sink.

use crate::sink::{SignalBatch, SignalSink, SinkError};
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;

/// Writes each batch as one JSON line to stdout. No network I/O.
pub struct ConsoleSink;

#[derive(Serialize)]
struct ConsoleLine<'a> {
    signal: &'a str,
    request: serde_json::Value,
}

impl ConsoleSink {
    fn render<T: SignalBatch>(batch: &T) -> Option<String> {
        let line = ConsoleLine {
            signal: T::SIGNAL.as_str(),
            request: serde_json::to_value(batch).unwrap_or_default(),
        };
        serde_json::to_string(&line).ok()
    }
}

#[async_trait]
impl<T: SignalBatch> SignalSink<T> for ConsoleSink {
    async fn export(&self, batch: T) -> Result<(), SinkError> {
        if let Some(json) = Self::render(&batch) {
            // Explicit locked I/O so a broken pipe never panics.
            let mut stdout = std::io::stdout().lock();
            let _ = writeln!(stdout, "{}", json);
        }
        Ok(())
    }

    async fn force_flush(&self) -> Result<(), SinkError> {
        let _ = std::io::stdout().lock().flush();
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
