//! Concrete sink implementations and scheme dispatch.
//!
//! Sink construction is an exhaustive match over [`EndpointScheme`]: every
//! scheme a connection change can validate has a constructor arm here, so a
//! new scheme cannot be added without deciding what sink it builds.

mod console;
mod grpc;
mod http;
mod noop;

pub use console::ConsoleSink;
pub use grpc::OtlpGrpcSink;
pub use http::OtlpHttpSink;
pub use noop::NoopSink;

use crate::sink::{SignalBatch, SignalSink, SinkError};
use otel_switchboard_config::{EndpointScheme, EndpointSpec};
use std::time::Duration;

/// Everything needed to construct a sink for one destination.
#[derive(Debug, Clone)]
pub struct SinkTarget {
    /// Validated scheme of the destination URL.
    pub scheme: EndpointScheme,
    /// Destination URL, scheme included.
    pub url: String,
    /// Bearer token sent with every export, if any.
    pub auth_token: Option<String>,
    /// PEM certificate bytes for TLS destinations, if any.
    pub cert_pem: Option<Vec<u8>>,
    /// Per-request export timeout.
    pub timeout: Duration,
    /// Whether to gzip OTLP/HTTP request bodies.
    pub gzip: bool,
}

impl SinkTarget {
    /// Builds a target from a resolved endpoint tuple.
    ///
    /// Certificate *bytes* are taken separately from the tuple's
    /// certificate *path*: reading the file is the credential loader's job
    /// and may legitimately have produced nothing.
    pub fn from_spec(
        spec: &EndpointSpec,
        scheme: EndpointScheme,
        cert_pem: Option<Vec<u8>>,
        timeout: Duration,
        gzip: bool,
    ) -> Self {
        Self {
            scheme,
            url: spec.url.clone(),
            auth_token: spec.auth_token.clone(),
            cert_pem,
            timeout,
            gzip,
        }
    }
}

/// Constructs the sink for a destination by scheme dispatch.
///
/// `console:` and `devnull:` short-circuit to in-memory sinks with no
/// network I/O. Remote schemes build a transport client; a malformed
/// target (bad URI, unparseable certificate) is an error, never a panic.
///
/// # Errors
///
/// Returns [`SinkError::InvalidTarget`] when the target cannot be turned
/// into a transport client.
pub fn build_sink<T: SignalBatch>(target: &SinkTarget) -> Result<Box<dyn SignalSink<T>>, SinkError> {
    match target.scheme {
        EndpointScheme::Http | EndpointScheme::Https => {
            Ok(Box::new(OtlpHttpSink::<T>::new(target)?))
        }
        EndpointScheme::Grpc | EndpointScheme::Grpcs => Ok(Box::new(OtlpGrpcSink::new(target)?)),
        EndpointScheme::Console => Ok(Box::new(ConsoleSink)),
        EndpointScheme::Devnull => Ok(Box::new(NoopSink)),
    }
}
