//! The application-facing context object.
//!
//! A [`Switchboard`] owns the three signal pipelines and is passed
//! explicitly by the application; there is no process-global instance and
//! no re-initialisation. The uninitialised state simply does not exist as
//! a value: [`SwitchboardBuilder::build`] consumes the builder and either
//! returns a working context or an error.

use crate::connection::{ConnectionChange, SignalConnection};
use crate::error::BuildError;
use crate::processor::ProcessorConfig;
use crate::record::{self, Severity};
use crate::resource::AttributeState;
use crate::sink::{LogBatch, MetricBatch, SpanBatch};
use otel_switchboard_config::SwitchboardConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

/// Builder for a [`Switchboard`].
///
/// Configuration sources layer in the usual order: compiled defaults, an
/// optional config file, standard `OTEL_*` environment variables, then the
/// programmatic overrides set here.
#[must_use = "builders do nothing unless .build() is called"]
#[derive(Debug, Default)]
pub struct SwitchboardBuilder {
    config: Option<SwitchboardConfig>,
    config_path: Option<PathBuf>,
    service_name: Option<String>,
    service_version: Option<String>,
    attributes: Vec<(String, String)>,
    endpoint: Option<String>,
    auth_token: Option<String>,
    metrics: Option<bool>,
    traces: Option<bool>,
    logs: Option<bool>,
}

impl SwitchboardBuilder {
    /// Creates a builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an already-resolved configuration instead of loading one.
    pub fn with_config(mut self, config: SwitchboardConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Layers a TOML config file into the resolved configuration.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Sets the `service.name` resource attribute.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the `service.version` resource attribute.
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Adds a fixed resource attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Overrides the base endpoint URL for all signals.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Overrides the bearer token for all signals.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Enables or disables the metrics pipeline.
    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics = Some(enabled);
        self
    }

    /// Enables or disables the traces pipeline.
    pub fn traces(mut self, enabled: bool) -> Self {
        self.traces = Some(enabled);
        self
    }

    /// Enables or disables the logs pipeline.
    pub fn logs(mut self, enabled: bool) -> Self {
        self.logs = Some(enabled);
        self
    }

    /// Resolves configuration and opens the enabled pipelines.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be resolved, an endpoint
    /// URL does not validate, or an initial sink cannot be constructed.
    pub async fn build(self) -> Result<Switchboard, BuildError> {
        let mut config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => SwitchboardConfig::load_from_path(path)?,
            (None, None) => SwitchboardConfig::load()?,
        };

        if let Some(url) = self.endpoint {
            config.exporter.endpoint = Some(url);
        }
        if let Some(token) = self.auth_token {
            config.exporter.auth_token = Some(token);
        }
        if let Some(enabled) = self.metrics {
            config.metrics.enabled = enabled;
        }
        if let Some(enabled) = self.traces {
            config.traces.enabled = enabled;
        }
        if let Some(enabled) = self.logs {
            config.logs.enabled = enabled;
        }

        let attrs = Arc::new(AttributeState::new(
            self.service_name
                .unwrap_or_else(|| "unknown_service".to_string()),
            self.service_version,
            self.attributes,
        ));

        let metrics = open_signal::<MetricBatch>(&config, &attrs).await?;
        let traces = open_signal::<SpanBatch>(&config, &attrs).await?;
        let logs = open_signal::<LogBatch>(&config, &attrs).await?;

        Ok(Switchboard {
            metrics,
            traces,
            logs,
            attrs,
        })
    }
}

async fn open_signal<T: crate::sink::SignalBatch>(
    config: &SwitchboardConfig,
    attrs: &Arc<AttributeState>,
) -> Result<Option<SignalConnection<T>>, BuildError> {
    if !config.enabled(T::SIGNAL) {
        return Ok(None);
    }

    let connection = SignalConnection::open(
        config.endpoint(T::SIGNAL),
        Arc::clone(attrs),
        ProcessorConfig::from_queue(&config.queue, config.export_interval(T::SIGNAL)),
        config.exporter.timeout,
        config.exporter.gzip,
    )
    .await?;

    Ok(Some(connection))
}

/// The application's telemetry context.
///
/// Owns up to three independent signal pipelines. Recording calls are
/// synchronous and non-blocking - they enqueue on the signal's processor
/// and return. Nothing on this surface panics or returns a transport
/// error; failures end as `tracing` warnings.
pub struct Switchboard {
    metrics: Option<SignalConnection<MetricBatch>>,
    traces: Option<SignalConnection<SpanBatch>>,
    logs: Option<SignalConnection<LogBatch>>,
    attrs: Arc<AttributeState>,
}

impl Switchboard {
    /// Starts building a switchboard.
    pub fn builder() -> SwitchboardBuilder {
        SwitchboardBuilder::new()
    }

    /// Adds `by` to a monotonic counter.
    pub fn increment_counter(&self, name: &str, by: u64, attrs: &[(&str, &str)]) {
        if let Some(connection) = &self.metrics {
            connection.enqueue(record::counter_batch(
                self.attrs.to_resource(),
                name,
                by,
                attrs,
            ));
        }
    }

    /// Records one histogram measurement.
    pub fn record_histogram(&self, name: &str, value: f64, attrs: &[(&str, &str)]) {
        if let Some(connection) = &self.metrics {
            connection.enqueue(record::histogram_batch(
                self.attrs.to_resource(),
                name,
                value,
                attrs,
            ));
        }
    }

    /// Records one finished span.
    pub fn record_span(
        &self,
        name: &str,
        start: SystemTime,
        end: SystemTime,
        attrs: &[(&str, &str)],
    ) {
        if let Some(connection) = &self.traces {
            connection.enqueue(record::span_batch(
                self.attrs.to_resource(),
                name,
                start,
                end,
                attrs,
            ));
        }
    }

    /// Emits one log record.
    pub fn emit_log(&self, severity: Severity, body: &str, attrs: &[(&str, &str)]) {
        if let Some(connection) = &self.logs {
            connection.enqueue(record::log_batch(
                self.attrs.to_resource(),
                severity,
                body,
                attrs,
            ));
        }
    }

    /// Redirects every enabled pipeline to a new destination.
    ///
    /// Returns `true` only if every enabled signal accepted and performed
    /// the swap. A `false` from one signal does not roll back another's
    /// completed swap - each pipeline is independent.
    pub async fn change_connection(&self, change: ConnectionChange) -> bool {
        let mut all_changed = true;

        if let Some(connection) = &self.metrics {
            all_changed &= connection.change_connection(&change).await;
        }
        if let Some(connection) = &self.traces {
            all_changed &= connection.change_connection(&change).await;
        }
        if let Some(connection) = &self.logs {
            all_changed &= connection.change_connection(&change).await;
        }

        all_changed
    }

    /// Flushes every enabled pipeline; failures are logged, never returned.
    pub async fn flush(&self) {
        if let Some(connection) = &self.metrics {
            connection.flush().await;
        }
        if let Some(connection) = &self.traces {
            connection.flush().await;
        }
        if let Some(connection) = &self.logs {
            connection.flush().await;
        }
    }

    /// Drains and tears down every pipeline.
    ///
    /// Consumes the context: after shutdown there is nothing to record
    /// against, by construction rather than by runtime flag.
    pub async fn shutdown(self) {
        if let Some(connection) = &self.metrics {
            connection.shutdown().await;
        }
        if let Some(connection) = &self.traces {
            connection.shutdown().await;
        }
        if let Some(connection) = &self.logs {
            connection.shutdown().await;
        }
    }

    /// The metrics pipeline, if enabled.
    pub fn metrics(&self) -> Option<&SignalConnection<MetricBatch>> {
        self.metrics.as_ref()
    }

    /// The traces pipeline, if enabled.
    pub fn traces(&self) -> Option<&SignalConnection<SpanBatch>> {
        self.traces.as_ref()
    }

    /// The logs pipeline, if enabled.
    pub fn logs(&self) -> Option<&SignalConnection<LogBatch>> {
        self.logs.as_ref()
    }

    /// The resource attribute state shared by all signals.
    pub fn attributes(&self) -> &Arc<AttributeState> {
        &self.attrs
    }
}
