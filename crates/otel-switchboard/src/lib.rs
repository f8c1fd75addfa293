//! Client-side telemetry SDK with live destination swapping.
//!
//! This crate lets an application emit counters, histograms, spans, and log
//! records while the *destination* of that telemetry (endpoint URL, auth
//! token, TLS certificate) can change at any moment during the process's
//! lifetime - for example when an anonymous session becomes an authenticated
//! one, or when a bearer token rotates.
//!
//! The moving part is the [`SinkShim`]: a mutex-guarded facade over one
//! replaceable [`SignalSink`]. Every export, flush, and shutdown serialises
//! through the shim's lock, and a connection change swaps the sink behind
//! the lock so that no caller ever observes a sink mid-replacement. The
//! batching [`BatchProcessor`] above the shim is created once per signal
//! and survives every swap, which is why data already enqueued is not lost
//! when the destination moves.
//!
//! Nothing here ever panics outward or rejects past the public surface: a
//! transport failure terminates as a `tracing` warning and, at worst, a
//! dropped batch. Availability of the host application is prioritised over
//! strict delivery.
//!
//! # Example
//!
//! ```no_run
//! use otel_switchboard::{ConnectionChange, Switchboard};
//!
//! # async fn run() -> Result<(), otel_switchboard::BuildError> {
//! let board = Switchboard::builder()
//!     .service_name("checkout")
//!     .endpoint("http://collector:4318")
//!     .build()
//!     .await?;
//!
//! board.increment_counter("orders.created", 1, &[("region", "eu-west-1")]);
//!
//! // The session authenticates; telemetry follows it to a new backend.
//! let moved = board
//!     .change_connection(
//!         ConnectionChange::new()
//!             .endpoint("https://tenant.collector.example.com")
//!             .auth_token("rotated-bearer-token")
//!             .user_id("user-1234"),
//!     )
//!     .await;
//! assert!(moved);
//!
//! board.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
mod context;
mod error;
mod processor;
mod record;
mod resource;
mod shim;
mod sink;
mod sinks;
mod sync;
#[cfg(test)]
mod testing;

pub use connection::{ConnectionChange, SignalConnection};
pub use context::{Switchboard, SwitchboardBuilder};
pub use error::{BuildError, Result};
pub use processor::{BatchProcessor, ProcessorConfig};
pub use record::Severity;
pub use resource::AttributeState;
pub use shim::SinkShim;
pub use sink::{LogBatch, MetricBatch, SignalBatch, SignalSink, SinkError, SpanBatch};
pub use sinks::{ConsoleSink, NoopSink, OtlpGrpcSink, OtlpHttpSink, SinkTarget, build_sink};
pub use sync::{HandoffGuard, HandoffMutex};

// The config collaborator's vocabulary is part of this crate's surface.
pub use otel_switchboard_config::{
    EndpointScheme, EndpointSpec, SignalKind, SwitchboardConfig, is_valid_endpoint_url,
};
