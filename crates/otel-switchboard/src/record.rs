//! Conversion of recording calls into OTLP payloads.
//!
//! The public recording API is a thin forwarding layer: each call becomes
//! one single-point OTLP envelope enqueued on the signal's processor.
//! Aggregation across calls is a backend concern, not this SDK's.

use crate::resource::string_attr;
use crate::sink::{LogBatch, MetricBatch, SpanBatch};
use opentelemetry_proto::tonic::common::v1::{AnyValue, InstrumentationScope, KeyValue, any_value};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{
    AggregationTemporality, Histogram, HistogramDataPoint, Metric, NumberDataPoint,
    ResourceMetrics, ScopeMetrics, Sum, metric::Data, number_data_point,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, span::SpanKind};
use std::time::{SystemTime, UNIX_EPOCH};

/// Scope name for instrumentation.
const SCOPE_NAME: &str = "otel-switchboard";
/// Scope version for instrumentation.
const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Severity of an emitted log record.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Finest-grained diagnostics.
    Trace,
    /// Debugging detail.
    Debug,
    /// Routine information.
    Info,
    /// Something surprising but survivable.
    Warn,
    /// Something went wrong.
    Error,
}

impl Severity {
    /// OTLP severity number for this level.
    pub fn number(self) -> i32 {
        match self {
            Severity::Trace => 1,
            Severity::Debug => 5,
            Severity::Info => 9,
            Severity::Warn => 13,
            Severity::Error => 17,
        }
    }

    /// Canonical severity text.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

fn scope() -> InstrumentationScope {
    InstrumentationScope {
        name: SCOPE_NAME.to_string(),
        version: SCOPE_VERSION.to_string(),
        ..Default::default()
    }
}

fn attributes(attrs: &[(&str, &str)]) -> Vec<KeyValue> {
    attrs.iter().map(|(k, v)| string_attr(k, v)).collect()
}

fn time_nanos(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

fn now_nanos() -> u64 {
    time_nanos(SystemTime::now())
}

fn metric_envelope(resource: Resource, metric: Metric) -> MetricBatch {
    MetricBatch {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(resource),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(scope()),
                metrics: vec![metric],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Builds a monotonic counter increment.
pub(crate) fn counter_batch(
    resource: Resource,
    name: &str,
    by: u64,
    attrs: &[(&str, &str)],
) -> MetricBatch {
    let point = NumberDataPoint {
        attributes: attributes(attrs),
        time_unix_nano: now_nanos(),
        value: Some(number_data_point::Value::AsInt(by as i64)),
        ..Default::default()
    };

    metric_envelope(
        resource,
        Metric {
            name: name.to_string(),
            data: Some(Data::Sum(Sum {
                data_points: vec![point],
                aggregation_temporality: AggregationTemporality::Delta as i32,
                is_monotonic: true,
            })),
            ..Default::default()
        },
    )
}

/// Builds a single-measurement histogram point.
pub(crate) fn histogram_batch(
    resource: Resource,
    name: &str,
    value: f64,
    attrs: &[(&str, &str)],
) -> MetricBatch {
    let point = HistogramDataPoint {
        attributes: attributes(attrs),
        time_unix_nano: now_nanos(),
        count: 1,
        sum: Some(value),
        min: Some(value),
        max: Some(value),
        ..Default::default()
    };

    metric_envelope(
        resource,
        Metric {
            name: name.to_string(),
            data: Some(Data::Histogram(Histogram {
                data_points: vec![point],
                aggregation_temporality: AggregationTemporality::Delta as i32,
            })),
            ..Default::default()
        },
    )
}

/// Builds a finished span.
pub(crate) fn span_batch(
    resource: Resource,
    name: &str,
    start: SystemTime,
    end: SystemTime,
    attrs: &[(&str, &str)],
) -> SpanBatch {
    let span = Span {
        trace_id: rand::random::<[u8; 16]>().to_vec(),
        span_id: rand::random::<[u8; 8]>().to_vec(),
        name: name.to_string(),
        kind: SpanKind::Internal as i32,
        start_time_unix_nano: time_nanos(start),
        end_time_unix_nano: time_nanos(end),
        attributes: attributes(attrs),
        ..Default::default()
    };

    SpanBatch {
        resource_spans: vec![ResourceSpans {
            resource: Some(resource),
            scope_spans: vec![ScopeSpans {
                scope: Some(scope()),
                spans: vec![span],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Builds one log record.
pub(crate) fn log_batch(
    resource: Resource,
    severity: Severity,
    body: &str,
    attrs: &[(&str, &str)],
) -> LogBatch {
    let record = LogRecord {
        time_unix_nano: now_nanos(),
        severity_number: severity.number(),
        severity_text: severity.as_str().to_string(),
        body: Some(AnyValue {
            value: Some(any_value::Value::StringValue(body.to_string())),
        }),
        attributes: attributes(attrs),
        ..Default::default()
    };

    LogBatch {
        resource_logs: vec![ResourceLogs {
            resource: Some(resource),
            scope_logs: vec![ScopeLogs {
                scope: Some(scope()),
                log_records: vec![record],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}
