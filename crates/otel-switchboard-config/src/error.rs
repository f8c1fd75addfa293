//! Error types for configuration loading.

use thiserror::Error;

/// Errors that can occur while resolving configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration extraction failed.
    #[error("configuration error")]
    Figment(#[source] Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Figment(Box::new(err))
    }
}
