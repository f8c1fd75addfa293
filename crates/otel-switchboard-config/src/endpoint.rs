//! Endpoint schemes, validation, and per-signal destination tuples.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// One of the three independent telemetry streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    /// Counters and histograms.
    Metrics,
    /// Spans.
    Traces,
    /// Log records.
    Logs,
}

impl SignalKind {
    /// Returns the lowercase name of this signal.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Metrics => "metrics",
            SignalKind::Traces => "traces",
            SignalKind::Logs => "logs",
        }
    }

    /// Returns the OTLP/HTTP path suffix for this signal.
    pub fn http_path(self) -> &'static str {
        match self {
            SignalKind::Metrics => "/v1/metrics",
            SignalKind::Traces => "/v1/traces",
            SignalKind::Logs => "/v1/logs",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination scheme for a telemetry endpoint.
///
/// The set is closed: every scheme a sink can be built for has a variant
/// here, so sink construction can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointScheme {
    /// OTLP over plain HTTP.
    Http,
    /// OTLP over HTTPS.
    Https,
    /// OTLP over plain gRPC.
    Grpc,
    /// OTLP over TLS gRPC.
    Grpcs,
    /// Human-readable debug output to stdout, no network I/O.
    Console,
    /// Discard everything, no network I/O.
    Devnull,
}

impl EndpointScheme {
    /// Returns the scheme as it appears in a URL.
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointScheme::Http => "http",
            EndpointScheme::Https => "https",
            EndpointScheme::Grpc => "grpc",
            EndpointScheme::Grpcs => "grpcs",
            EndpointScheme::Console => "console",
            EndpointScheme::Devnull => "devnull",
        }
    }

    /// Whether this scheme carries data over the network.
    pub fn is_remote(self) -> bool {
        !matches!(self, EndpointScheme::Console | EndpointScheme::Devnull)
    }

    /// Whether this scheme can use TLS credentials.
    pub fn uses_tls(self) -> bool {
        matches!(self, EndpointScheme::Https | EndpointScheme::Grpcs)
    }

    /// Extracts and parses the scheme of an endpoint URL.
    ///
    /// Returns `None` for URLs that do not parse or whose scheme has no
    /// variant here.
    pub fn of_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        parsed.scheme().parse().ok()
    }
}

impl fmt::Display for EndpointScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown endpoint scheme.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported endpoint scheme: {0}")]
pub struct UnsupportedScheme(String);

impl FromStr for EndpointScheme {
    type Err = UnsupportedScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(EndpointScheme::Http),
            "https" => Ok(EndpointScheme::Https),
            "grpc" => Ok(EndpointScheme::Grpc),
            "grpcs" => Ok(EndpointScheme::Grpcs),
            "console" => Ok(EndpointScheme::Console),
            "devnull" => Ok(EndpointScheme::Devnull),
            other => Err(UnsupportedScheme(other.to_string())),
        }
    }
}

/// Checks whether a URL is acceptable as a telemetry destination.
///
/// `console:` and `devnull:` URLs are always valid; they never reach the
/// network. Remote schemes must parse and carry a host. Anything else,
/// including URLs with unknown schemes, is rejected.
pub fn is_valid_endpoint_url(url: &str) -> bool {
    let Some(scheme) = EndpointScheme::of_url(url) else {
        return false;
    };

    if !scheme.is_remote() {
        return true;
    }

    match Url::parse(url) {
        Ok(parsed) => parsed.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// A resolved destination tuple for one signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Endpoint URL, scheme included.
    pub url: String,
    /// Bearer token sent with every export, if any.
    pub auth_token: Option<String>,
    /// Path to a PEM certificate for TLS endpoints, if any.
    pub cert_file: Option<PathBuf>,
}

impl EndpointSpec {
    /// Creates a spec with only a URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            cert_file: None,
        }
    }

    /// Returns a copy with the supplied fields layered over this spec.
    ///
    /// `None` means "keep the current value", not "clear it".
    pub fn merged(
        &self,
        url: Option<&str>,
        auth_token: Option<&str>,
        cert_file: Option<&Path>,
    ) -> EndpointSpec {
        EndpointSpec {
            url: url.map_or_else(|| self.url.clone(), str::to_string),
            auth_token: auth_token
                .map(str::to_string)
                .or_else(|| self.auth_token.clone()),
            cert_file: cert_file
                .map(Path::to_path_buf)
                .or_else(|| self.cert_file.clone()),
        }
    }
}
