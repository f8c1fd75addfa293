//! Endpoint, credential, and export configuration for otel-switchboard.
//!
//! This crate resolves *where* telemetry goes: per-signal endpoint tuples
//! (URL, bearer token, TLS certificate), export intervals, and batching
//! limits. It is deliberately separate from the export pipeline so that the
//! pipeline can treat destination resolution as a collaborator with a small
//! surface: [`SwitchboardConfig::endpoint`], [`is_valid_endpoint_url`], and
//! [`read_cert_file`].
//!
//! # Layered configuration
//!
//! Configuration combines, in order of priority:
//! 1. Default values (compiled in)
//! 2. An optional TOML config file
//! 3. Standard OpenTelemetry environment variables (`OTEL_EXPORTER_OTLP_*`)
//! 4. Environment variables with the `SWITCHBOARD_` prefix
//!
//! # Example
//!
//! ```no_run
//! use otel_switchboard_config::{SignalKind, SwitchboardConfig};
//!
//! let config = SwitchboardConfig::load()?;
//! let endpoint = config.endpoint(SignalKind::Metrics);
//! let interval = config.export_interval(SignalKind::Metrics);
//! # Ok::<(), otel_switchboard_config::ConfigError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod credentials;
mod endpoint;
mod error;

pub use config::{ExporterConfig, QueueConfig, SignalConfig, SwitchboardConfig};
pub use credentials::read_cert_file;
pub use endpoint::{
    EndpointScheme, EndpointSpec, SignalKind, UnsupportedScheme, is_valid_endpoint_url,
};
pub use error::ConfigError;
