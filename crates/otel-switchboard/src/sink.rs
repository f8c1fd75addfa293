//! The sink capability set and its transport errors.
//!
//! A sink is the minimal capability object representing one concrete
//! destination for one signal kind: it can export a batch, force-flush, and
//! shut down. Everything above it (the shim, the processor, the connection
//! change protocol) is payload-agnostic; the batch types only matter at the
//! wire.

use async_trait::async_trait;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::logs::v1::logs_service_client::LogsServiceClient;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::trace_service_client::TraceServiceClient;
use otel_switchboard_config::SignalKind;
use prost::Message;
use serde::Serialize;
use tonic::transport::Channel;

/// Batched metric payload.
pub type MetricBatch = ExportMetricsServiceRequest;
/// Batched span payload.
pub type SpanBatch = ExportTraceServiceRequest;
/// Batched log-record payload.
pub type LogBatch = ExportLogsServiceRequest;

/// Error from a sink operation.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// HTTP request failed.
    #[error("HTTP request failed")]
    Http(#[from] reqwest::Error),

    /// Server returned an error status.
    #[error("server returned {status}: {body}")]
    Status {
        /// HTTP status code returned by server.
        status: u16,
        /// Response body from server.
        body: String,
    },

    /// gRPC call failed.
    #[error("gRPC export failed")]
    Grpc(#[from] tonic::Status),

    /// Encoding failed.
    #[error("failed to encode request")]
    Encode(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The destination description could not be turned into a sink.
    #[error("invalid sink target: {0}")]
    InvalidTarget(String),

    /// The shim was shut down; the batch never reached a sink.
    #[error("exporter is shut down")]
    ShutDown,
}

impl SinkError {
    pub(crate) fn encode<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Encode(Box::new(error))
    }

    pub(crate) fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub(crate) fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }
}

/// One concrete destination for one signal kind.
///
/// Implementations must resolve every call exactly once and must never
/// panic; all failure is an `Err`. `shutdown` is not assumed to be
/// idempotent here - the [`SinkShim`](crate::SinkShim) enforces that.
#[async_trait]
pub trait SignalSink<T>: Send + Sync {
    /// Exports one batch to the destination.
    async fn export(&self, batch: T) -> Result<(), SinkError>;

    /// Drains any internally buffered data; best-effort.
    async fn force_flush(&self) -> Result<(), SinkError>;

    /// Releases the destination's resources.
    async fn shutdown(&self) -> Result<(), SinkError>;
}

/// An OTLP batch payload for one signal kind.
///
/// Implemented by the three generated request types; the trait carries the
/// signal-specific pieces (envelope merging and the generated gRPC client
/// dispatch) so that sinks, shims, and processors can stay generic.
#[async_trait]
pub trait SignalBatch:
    Message + Serialize + Default + Clone + Send + Sync + 'static
{
    /// The signal this payload belongs to.
    const SIGNAL: SignalKind;

    /// Appends another batch's envelopes onto this one.
    fn merge(&mut self, other: Self);

    /// Whether the batch carries no envelopes at all.
    fn is_empty(&self) -> bool;

    /// Exports this request over an established gRPC channel using the
    /// signal's generated service client.
    async fn export_grpc(
        channel: Channel,
        request: tonic::Request<Self>,
    ) -> Result<(), tonic::Status>;
}

#[async_trait]
impl SignalBatch for MetricBatch {
    const SIGNAL: SignalKind = SignalKind::Metrics;

    fn merge(&mut self, other: Self) {
        self.resource_metrics.extend(other.resource_metrics);
    }

    fn is_empty(&self) -> bool {
        self.resource_metrics.is_empty()
    }

    async fn export_grpc(
        channel: Channel,
        request: tonic::Request<Self>,
    ) -> Result<(), tonic::Status> {
        MetricsServiceClient::new(channel).export(request).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalBatch for SpanBatch {
    const SIGNAL: SignalKind = SignalKind::Traces;

    fn merge(&mut self, other: Self) {
        self.resource_spans.extend(other.resource_spans);
    }

    fn is_empty(&self) -> bool {
        self.resource_spans.is_empty()
    }

    async fn export_grpc(
        channel: Channel,
        request: tonic::Request<Self>,
    ) -> Result<(), tonic::Status> {
        TraceServiceClient::new(channel).export(request).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalBatch for LogBatch {
    const SIGNAL: SignalKind = SignalKind::Logs;

    fn merge(&mut self, other: Self) {
        self.resource_logs.extend(other.resource_logs);
    }

    fn is_empty(&self) -> bool {
        self.resource_logs.is_empty()
    }

    async fn export_grpc(
        channel: Channel,
        request: tonic::Request<Self>,
    ) -> Result<(), tonic::Status> {
        LogsServiceClient::new(channel).export(request).await?;
        Ok(())
    }
}
