//! Layered configuration loading.
//!
//! Configuration is loaded from (in order of priority):
//! 1. Default values (compiled in)
//! 2. An optional TOML config file
//! 3. Standard OpenTelemetry environment variables (`OTEL_*`)
//! 4. Environment variables with the `SWITCHBOARD_` prefix
//!
//! # Supported Standard Environment Variables
//!
//! | Variable | Config Path | Description |
//! |----------|-------------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | `exporter.endpoint` | Base endpoint URL for all signals |
//! | `OTEL_EXPORTER_OTLP_METRICS_ENDPOINT` | `metrics.endpoint` | Metrics endpoint override |
//! | `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` | `traces.endpoint` | Traces endpoint override |
//! | `OTEL_EXPORTER_OTLP_LOGS_ENDPOINT` | `logs.endpoint` | Logs endpoint override |
//! | `OTEL_EXPORTER_OTLP_CERTIFICATE` | `exporter.cert_file` | PEM certificate path |
//! | `OTEL_EXPORTER_OTLP_HEADERS` | `exporter.auth_token` | `authorization=Bearer <t>` is extracted |
//! | `OTEL_EXPORTER_OTLP_TIMEOUT` | `exporter.timeout` | Export timeout in milliseconds |
//! | `OTEL_METRIC_EXPORT_INTERVAL` | `metrics.export_interval` | Metric export interval in milliseconds |
//!
//! Variables with the `SWITCHBOARD_` prefix take precedence.

use crate::endpoint::{EndpointSpec, SignalKind};
use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const ENV_PREFIX: &str = "SWITCHBOARD_";

/// Default OTLP/HTTP endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4318";

/// Main configuration struct for the switchboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Exporter defaults shared by all signals.
    pub exporter: ExporterConfig,
    /// Metrics signal configuration.
    pub metrics: SignalConfig,
    /// Traces signal configuration.
    pub traces: SignalConfig,
    /// Logs signal configuration.
    pub logs: SignalConfig,
    /// Queue and batch limits shared by all signals.
    pub queue: QueueConfig,
}

impl SwitchboardConfig {
    /// Loads configuration from environment variables and defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load() -> Result<Self, ConfigError> {
        Self::layered(None)
    }

    /// Loads configuration from a TOML file plus environment variables.
    ///
    /// A missing file is not an error; the remaining layers still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration parsing fails.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        Self::layered(Some(config_path.as_ref()))
    }

    fn layered(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(SwitchboardConfig::default()));

        if let Some(path) = config_path
            && path.exists()
        {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(standard_otel_env());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("_"));

        figment.extract().map_err(ConfigError::from)
    }

    fn signal(&self, signal: SignalKind) -> &SignalConfig {
        match signal {
            SignalKind::Metrics => &self.metrics,
            SignalKind::Traces => &self.traces,
            SignalKind::Logs => &self.logs,
        }
    }

    /// Resolves the destination tuple for a signal.
    ///
    /// Per-signal overrides win over the shared exporter settings; the
    /// compiled-in [`DEFAULT_ENDPOINT`] is the last resort for the URL.
    pub fn endpoint(&self, signal: SignalKind) -> EndpointSpec {
        let per_signal = self.signal(signal);

        EndpointSpec {
            url: per_signal
                .endpoint
                .clone()
                .or_else(|| self.exporter.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            auth_token: per_signal
                .auth_token
                .clone()
                .or_else(|| self.exporter.auth_token.clone()),
            cert_file: per_signal
                .cert_file
                .clone()
                .or_else(|| self.exporter.cert_file.clone()),
        }
    }

    /// Returns the periodic export interval for a signal.
    pub fn export_interval(&self, signal: SignalKind) -> Duration {
        self.signal(signal).export_interval
    }

    /// Returns whether a signal is enabled.
    pub fn enabled(&self, signal: SignalKind) -> bool {
        self.signal(signal).enabled
    }
}

/// Exporter defaults shared by all signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Base endpoint URL for all signals.
    pub endpoint: Option<String>,
    /// Bearer token sent with every export.
    pub auth_token: Option<String>,
    /// Path to a PEM certificate for TLS endpoints.
    pub cert_file: Option<PathBuf>,
    /// Export request timeout in milliseconds.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Whether to gzip OTLP/HTTP request bodies.
    pub gzip: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            cert_file: None,
            timeout: Duration::from_secs(10),
            gzip: true,
        }
    }
}

/// Per-signal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Whether the signal pipeline is created at all.
    pub enabled: bool,
    /// Endpoint URL override for this signal.
    pub endpoint: Option<String>,
    /// Bearer token override for this signal.
    pub auth_token: Option<String>,
    /// Certificate path override for this signal.
    pub cert_file: Option<PathBuf>,
    /// Periodic export interval in milliseconds.
    #[serde(with = "duration_ms")]
    pub export_interval: Duration,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            auth_token: None,
            cert_file: None,
            export_interval: Duration::from_secs(30),
        }
    }
}

/// Queue and batch limits shared by all signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum entries per exported batch.
    pub max_batch_entries: usize,
    /// Maximum encoded bytes per exported batch.
    pub max_batch_bytes: usize,
    /// Maximum entries queued before the oldest are dropped.
    pub max_queue_entries: usize,
    /// Maximum encoded bytes queued before the oldest are dropped.
    pub max_queue_bytes: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_entries: 512,
            max_batch_bytes: 4 * 1024 * 1024,
            max_queue_entries: 2048,
            max_queue_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Partial per-signal config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialSignalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    export_interval: Option<u64>,
}

/// Partial exporter config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialExporterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cert_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

/// Partial config for standard OTEL env var overrides.
#[derive(Debug, Default, Serialize)]
struct PartialConfig {
    exporter: PartialExporterConfig,
    #[serde(skip_serializing_if = "is_partial_signal_empty")]
    metrics: PartialSignalConfig,
    #[serde(skip_serializing_if = "is_partial_signal_empty")]
    traces: PartialSignalConfig,
    #[serde(skip_serializing_if = "is_partial_signal_empty")]
    logs: PartialSignalConfig,
}

fn is_partial_signal_empty(config: &PartialSignalConfig) -> bool {
    config.endpoint.is_none() && config.export_interval.is_none()
}

fn standard_otel_env() -> Serialized<PartialConfig> {
    let mut config = PartialConfig::default();

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.exporter.endpoint = Some(endpoint);
    }

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT") {
        config.metrics.endpoint = Some(endpoint);
    }

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT") {
        config.traces.endpoint = Some(endpoint);
    }

    if let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT") {
        config.logs.endpoint = Some(endpoint);
    }

    if let Ok(cert) = std::env::var("OTEL_EXPORTER_OTLP_CERTIFICATE") {
        config.exporter.cert_file = Some(PathBuf::from(cert));
    }

    if let Ok(headers) = std::env::var("OTEL_EXPORTER_OTLP_HEADERS") {
        config.exporter.auth_token = bearer_from_headers(&headers);
    }

    if let Ok(timeout) = std::env::var("OTEL_EXPORTER_OTLP_TIMEOUT") {
        config.exporter.timeout = timeout.parse().ok();
    }

    if let Ok(interval) = std::env::var("OTEL_METRIC_EXPORT_INTERVAL") {
        config.metrics.export_interval = interval.parse().ok();
    }

    Serialized::defaults(config)
}

/// Extracts a bearer token from a W3C-style `key=value,key=value` header list.
fn bearer_from_headers(headers: &str) -> Option<String> {
    for pair in headers.split(',') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };

        if !key.trim().eq_ignore_ascii_case("authorization") {
            continue;
        }

        let value = value.trim();
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .unwrap_or(value);

        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    None
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SwitchboardConfig::default();

        assert!(config.exporter.endpoint.is_none());
        assert!(config.exporter.auth_token.is_none());
        assert_eq!(config.exporter.timeout, Duration::from_secs(10));
        assert!(config.exporter.gzip);

        for signal in [SignalKind::Metrics, SignalKind::Traces, SignalKind::Logs] {
            assert!(config.enabled(signal));
            assert_eq!(config.export_interval(signal), Duration::from_secs(30));
            assert_eq!(config.endpoint(signal).url, DEFAULT_ENDPOINT);
        }
    }

    #[test]
    fn test_per_signal_override_wins() {
        let mut config = SwitchboardConfig::default();
        config.exporter.endpoint = Some("http://base:4318".to_string());
        config.traces.endpoint = Some("http://traces-only:4318".to_string());

        assert_eq!(config.endpoint(SignalKind::Metrics).url, "http://base:4318");
        assert_eq!(
            config.endpoint(SignalKind::Traces).url,
            "http://traces-only:4318"
        );
    }

    #[test]
    fn test_load_from_toml() {
        let toml_content = r#"
[exporter]
endpoint = "https://collector.example.com"
auth_token = "file-token"
timeout = 2500
gzip = false

[metrics]
export_interval = 5000

[logs]
enabled = false

[queue]
max_batch_entries = 64
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = SwitchboardConfig::load_from_path(temp_file.path()).unwrap();

        assert_eq!(
            config.endpoint(SignalKind::Metrics).url,
            "https://collector.example.com"
        );
        assert_eq!(
            config.endpoint(SignalKind::Metrics).auth_token.as_deref(),
            Some("file-token")
        );
        assert_eq!(config.exporter.timeout, Duration::from_millis(2500));
        assert!(!config.exporter.gzip);
        assert_eq!(
            config.export_interval(SignalKind::Metrics),
            Duration::from_secs(5)
        );
        assert!(!config.enabled(SignalKind::Logs));
        assert!(config.enabled(SignalKind::Traces));
        assert_eq!(config.queue.max_batch_entries, 64);
    }

    #[test]
    fn test_load_nonexistent_file_uses_defaults() {
        let config = SwitchboardConfig::load_from_path("/nonexistent/path/config.toml").unwrap();

        assert_eq!(config.endpoint(SignalKind::Traces).url, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_standard_env_endpoint() {
        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_ENDPOINT", Some("http://env:4318")),
                (
                    "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT",
                    Some("grpc://env-traces:4317"),
                ),
            ],
            || {
                let config = SwitchboardConfig::load().unwrap();

                assert_eq!(config.endpoint(SignalKind::Metrics).url, "http://env:4318");
                assert_eq!(
                    config.endpoint(SignalKind::Traces).url,
                    "grpc://env-traces:4317"
                );
            },
        );
    }

    #[test]
    fn test_env_headers_bearer_extraction() {
        temp_env::with_vars(
            [(
                "OTEL_EXPORTER_OTLP_HEADERS",
                Some("x-tenant=abc,authorization=Bearer secret-token"),
            )],
            || {
                let config = SwitchboardConfig::load().unwrap();
                assert_eq!(
                    config.endpoint(SignalKind::Logs).auth_token.as_deref(),
                    Some("secret-token")
                );
            },
        );
    }

    #[test]
    fn test_prefixed_env_beats_standard_env() {
        temp_env::with_vars(
            [
                ("OTEL_EXPORTER_OTLP_ENDPOINT", Some("http://standard:4318")),
                (
                    "SWITCHBOARD_EXPORTER_ENDPOINT",
                    Some("http://prefixed:4318"),
                ),
            ],
            || {
                let config = SwitchboardConfig::load().unwrap();
                assert_eq!(
                    config.endpoint(SignalKind::Metrics).url,
                    "http://prefixed:4318"
                );
            },
        );
    }

    #[test]
    fn test_bearer_from_headers() {
        assert_eq!(
            bearer_from_headers("authorization=Bearer abc"),
            Some("abc".to_string())
        );
        assert_eq!(
            bearer_from_headers("Authorization=bearer abc"),
            Some("abc".to_string())
        );
        assert_eq!(
            bearer_from_headers("authorization=abc"),
            Some("abc".to_string())
        );
        assert_eq!(bearer_from_headers("x-api-key=abc"), None);
        assert_eq!(bearer_from_headers(""), None);
    }

    #[test]
    fn test_metric_interval_env() {
        temp_env::with_vars([("OTEL_METRIC_EXPORT_INTERVAL", Some("1500"))], || {
            let config = SwitchboardConfig::load().unwrap();
            assert_eq!(
                config.export_interval(SignalKind::Metrics),
                Duration::from_millis(1500)
            );
            assert_eq!(
                config.export_interval(SignalKind::Traces),
                Duration::from_secs(30)
            );
        });
    }
}
