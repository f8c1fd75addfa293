//! Error types for the switchboard.

use crate::sink::SinkError;
use otel_switchboard_config::ConfigError;

/// A specialised Result type for export-path operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur while building a [`Switchboard`](crate::Switchboard).
///
/// Construction is the one place destination problems are hard errors: a
/// process that cannot set up its initial pipelines should hear about it.
/// After construction, nothing propagates outward.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Configuration could not be resolved.
    #[error("configuration error")]
    Config(#[from] ConfigError),

    /// The configured endpoint URL is malformed or has an unknown scheme.
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    /// The initial sink could not be constructed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}
