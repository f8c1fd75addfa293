//! Per-signal connections and the live connection-change protocol.
//!
//! A [`SignalConnection`] owns one signal's whole pipeline: the endpoint
//! state, the [`SinkShim`], and the persistent [`BatchProcessor`]. Its
//! [`change_connection`](SignalConnection::change_connection) redirects the
//! pipeline to a new destination while exports keep arriving:
//!
//! 1. merge the supplied fields over the current endpoint,
//! 2. validate the merged URL (failure changes nothing and returns `false`),
//! 3. read TLS credentials if the scheme wants them (best-effort),
//! 4. build a brand-new sink for the merged target,
//! 5. drain the processor against the *old* sink (best-effort),
//! 6. atomically swap the sink behind the shim,
//! 7. shut the old sink down outside the lock (best-effort).
//!
//! The swap in step 6 is the point of no return: once it has happened the
//! change reports `true` no matter how the old sink's teardown goes.

use crate::error::BuildError;
use crate::processor::{BatchProcessor, ProcessorConfig};
use crate::resource::AttributeState;
use crate::shim::SinkShim;
use crate::sink::SignalBatch;
use crate::sinks::{SinkTarget, build_sink};
use otel_switchboard_config::{
    EndpointScheme, EndpointSpec, SignalKind, is_valid_endpoint_url, read_cert_file,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A requested destination change.
///
/// Omitted fields keep their current value; they are never cleared. The
/// change applies to every enabled signal when issued through the
/// [`Switchboard`](crate::Switchboard).
#[must_use = "a change does nothing until passed to change_connection"]
#[derive(Debug, Clone, Default)]
pub struct ConnectionChange {
    pub(crate) endpoint: Option<String>,
    pub(crate) auth_token: Option<String>,
    pub(crate) cert_file: Option<PathBuf>,
    pub(crate) user_id: Option<String>,
    pub(crate) drain_timeout: Option<Duration>,
}

impl ConnectionChange {
    /// Creates an empty change.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the new endpoint URL.
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Sets the new bearer token.
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the new TLS certificate path.
    pub fn cert_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_file = Some(path.into());
        self
    }

    /// Sets the user id to attach to subsequent telemetry.
    ///
    /// The id is applied to attribute state even when the rest of the
    /// change fails validation, matching the behaviour applications have
    /// come to rely on.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Bounds the pre-swap drain of data buffered against the old sink.
    ///
    /// Without a bound, a drain hung on a dead destination blocks the
    /// change (and the signal's whole pipeline) indefinitely. With one,
    /// the drain is abandoned at the deadline - losing whatever it had in
    /// flight - and the swap proceeds.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }
}

/// One signal's pipeline: endpoint state, shim, and batching processor.
pub struct SignalConnection<T: SignalBatch> {
    endpoint: tokio::sync::Mutex<EndpointSpec>,
    shim: Arc<SinkShim<T>>,
    processor: Arc<BatchProcessor<T>>,
    attrs: Arc<AttributeState>,
    export_timeout: Duration,
    gzip: bool,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: SignalBatch> SignalConnection<T> {
    /// Opens the pipeline for an initial destination and starts its
    /// periodic flush loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL does not validate or the
    /// initial sink cannot be constructed. Construction is the one moment
    /// a bad destination is a hard error.
    pub async fn open(
        spec: EndpointSpec,
        attrs: Arc<AttributeState>,
        processor_config: ProcessorConfig,
        export_timeout: Duration,
        gzip: bool,
    ) -> Result<Self, BuildError> {
        let scheme = validate(&spec.url).ok_or_else(|| BuildError::InvalidEndpoint(spec.url.clone()))?;

        let cert_pem = load_cert(&spec, scheme).await;
        let target = SinkTarget::from_spec(&spec, scheme, cert_pem, export_timeout, gzip);
        let sink = build_sink::<T>(&target)?;

        let shim = Arc::new(SinkShim::new(sink));
        let processor = BatchProcessor::new(processor_config, Arc::clone(&shim));
        let flush_task = BatchProcessor::spawn_flush_loop(&processor);

        tracing::debug!(signal = %T::SIGNAL, url = %spec.url, "signal connection opened");

        Ok(Self {
            endpoint: tokio::sync::Mutex::new(spec),
            shim,
            processor,
            attrs,
            export_timeout,
            gzip,
            flush_task: Mutex::new(Some(flush_task)),
        })
    }

    /// The signal this connection carries.
    pub fn signal(&self) -> SignalKind {
        T::SIGNAL
    }

    /// The shim this connection exports through.
    pub fn shim(&self) -> &Arc<SinkShim<T>> {
        &self.shim
    }

    /// The persistent batching processor above the shim.
    pub fn processor(&self) -> &Arc<BatchProcessor<T>> {
        &self.processor
    }

    /// Enqueues one payload for the next flush.
    pub fn enqueue(&self, item: T) {
        self.processor.enqueue(item);
    }

    /// Returns a copy of the current destination tuple.
    pub async fn endpoint(&self) -> EndpointSpec {
        self.endpoint.lock().await.clone()
    }

    /// Redirects this pipeline to a new destination.
    ///
    /// Never panics and never returns an error: `false` means validation
    /// or sink construction rejected the change and nothing was replaced;
    /// `true` means the new sink is installed. Transport trouble during
    /// the old sink's drain or teardown is logged and does not affect the
    /// outcome - the swap, not the teardown, decides success.
    ///
    /// Concurrent changes serialise; exports in flight during the swap
    /// land on whichever sink was current when they acquired the shim's
    /// lock.
    pub async fn change_connection(&self, change: &ConnectionChange) -> bool {
        // Applied before validation on purpose: a rejected endpoint still
        // carries the caller's user identity into subsequent telemetry.
        if let Some(user_id) = change
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            self.attrs.set_user_id(user_id);
        }

        let mut endpoint = self.endpoint.lock().await;
        let merged = endpoint.merged(
            change.endpoint.as_deref(),
            change.auth_token.as_deref(),
            change.cert_file.as_deref(),
        );

        let Some(scheme) = validate(&merged.url) else {
            tracing::warn!(
                signal = %T::SIGNAL,
                url = %merged.url,
                "connection change rejected: invalid endpoint URL"
            );
            return false;
        };

        let cert_pem = load_cert(&merged, scheme).await;
        let target = SinkTarget::from_spec(&merged, scheme, cert_pem, self.export_timeout, self.gzip);

        let new_sink = match build_sink::<T>(&target) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!(
                    signal = %T::SIGNAL,
                    url = %merged.url,
                    error = %e,
                    "connection change rejected: could not build sink"
                );
                return false;
            }
        };

        // Drain data buffered against the old sink; best-effort. An
        // abandoned drain drops its in-flight batch and releases the
        // shim's lock, so the swap below can proceed.
        let drained = match change.drain_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.processor.force_flush()).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        signal = %T::SIGNAL,
                        timeout_ms = limit.as_millis() as u64,
                        "pre-swap drain timed out, proceeding with swap"
                    );
                    Ok(())
                }
            },
            None => self.processor.force_flush().await,
        };
        if let Err(e) = drained {
            tracing::warn!(
                signal = %T::SIGNAL,
                error = %e,
                "pre-swap flush failed, continuing with swap"
            );
        }

        let old_sink = self.shim.swap_exporter(new_sink).await;
        tracing::debug!(signal = %T::SIGNAL, url = %merged.url, "sink swapped to new destination");
        *endpoint = merged;
        drop(endpoint);

        // Old-sink teardown runs outside the shim's lock so a slow network
        // goodbye never blocks exports against the new sink.
        tokio::spawn(async move {
            if let Err(e) = old_sink.shutdown().await {
                tracing::warn!(
                    signal = %T::SIGNAL,
                    error = %e,
                    "old sink shutdown failed after swap"
                );
            }
        });

        true
    }

    /// Flushes everything queued; failures are logged, never returned.
    pub async fn flush(&self) {
        if let Err(e) = self.processor.force_flush().await {
            tracing::warn!(signal = %T::SIGNAL, error = %e, "flush failed, dropping batch");
        }
    }

    /// Tears the pipeline down; failures are logged, never returned.
    pub async fn shutdown(&self) {
        if let Err(e) = self.processor.shutdown().await {
            tracing::warn!(signal = %T::SIGNAL, error = %e, "shutdown lost telemetry");
        }

        let task = self.flush_task.lock().expect("flush task poisoned").take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    pub(crate) fn attrs(&self) -> &Arc<AttributeState> {
        &self.attrs
    }
}

fn validate(url: &str) -> Option<EndpointScheme> {
    if !is_valid_endpoint_url(url) {
        return None;
    }
    EndpointScheme::of_url(url)
}

async fn load_cert(spec: &EndpointSpec, scheme: EndpointScheme) -> Option<Vec<u8>> {
    match &spec.cert_file {
        Some(path) if scheme.uses_tls() => read_cert_file(path).await,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MetricBatch;
    use crate::testing::{RecordingSink, SinkProbe};
    use opentelemetry_proto::tonic::metrics::v1::ResourceMetrics;
    use std::time::Duration;

    fn item() -> MetricBatch {
        MetricBatch {
            resource_metrics: vec![ResourceMetrics::default()],
        }
    }

    async fn devnull_connection() -> SignalConnection<MetricBatch> {
        SignalConnection::open(
            EndpointSpec::new("devnull:"),
            Arc::new(AttributeState::new("test", None, Vec::new())),
            ProcessorConfig::default(),
            Duration::from_secs(5),
            false,
        )
        .await
        .unwrap()
    }

    /// Installs a recording sink behind the connection's shim.
    async fn instrument(
        connection: &SignalConnection<MetricBatch>,
    ) -> Arc<SinkProbe<MetricBatch>> {
        let (sink, probe) = RecordingSink::new();
        let _old = connection.shim().swap_exporter(Box::new(sink)).await;
        probe
    }

    async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_endpoint() {
        let result = SignalConnection::<MetricBatch>::open(
            EndpointSpec::new("not-a-valid-url"),
            Arc::new(AttributeState::new("test", None, Vec::new())),
            ProcessorConfig::default(),
            Duration::from_secs(5),
            false,
        )
        .await;

        assert!(matches!(result, Err(BuildError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_change_to_invalid_url_keeps_current_sink() {
        let connection = devnull_connection().await;
        let probe = instrument(&connection).await;

        let changed = connection
            .change_connection(&ConnectionChange::new().endpoint("not-a-valid-url"))
            .await;
        assert!(!changed);

        // The original sink still receives exports.
        connection.enqueue(item());
        connection.flush().await;
        assert_eq!(probe.export_count(), 1);

        assert_eq!(connection.endpoint().await.url, "devnull:");
    }

    #[tokio::test]
    async fn test_change_swaps_and_retires_old_sink() {
        let connection = devnull_connection().await;
        let probe = instrument(&connection).await;

        connection.enqueue(item());

        let changed = connection
            .change_connection(&ConnectionChange::new().endpoint("console:"))
            .await;
        assert!(changed);
        assert_eq!(connection.endpoint().await.url, "console:");

        // The buffered item was drained to the old sink before the swap.
        assert_eq!(probe.export_count(), 1);

        // The old sink is shut down asynchronously after the swap.
        wait_for("old sink shutdown", || probe.shutdown_calls() == 1).await;

        // Subsequent exports no longer reach the old sink.
        connection.enqueue(item());
        connection.flush().await;
        assert_eq!(probe.export_count(), 1);
    }

    #[tokio::test]
    async fn test_omitted_fields_keep_current_values() {
        let connection = SignalConnection::<MetricBatch>::open(
            EndpointSpec {
                url: "devnull:".to_string(),
                auth_token: Some("original-token".to_string()),
                cert_file: None,
            },
            Arc::new(AttributeState::new("test", None, Vec::new())),
            ProcessorConfig::default(),
            Duration::from_secs(5),
            false,
        )
        .await
        .unwrap();

        let changed = connection
            .change_connection(&ConnectionChange::new().endpoint("console:"))
            .await;
        assert!(changed);

        let endpoint = connection.endpoint().await;
        assert_eq!(endpoint.url, "console:");
        assert_eq!(endpoint.auth_token.as_deref(), Some("original-token"));
    }

    #[tokio::test]
    async fn test_user_id_applies_even_when_endpoint_is_rejected() {
        let connection = devnull_connection().await;

        let changed = connection
            .change_connection(
                &ConnectionChange::new()
                    .endpoint("not-a-valid-url")
                    .user_id("  user-77  "),
            )
            .await;

        assert!(!changed);
        assert_eq!(connection.attrs().user_id().as_deref(), Some("user-77"));
    }

    #[tokio::test]
    async fn test_blank_user_id_is_ignored() {
        let connection = devnull_connection().await;

        connection
            .change_connection(&ConnectionChange::new().user_id("   "))
            .await;

        assert_eq!(connection.attrs().user_id(), None);
    }

    #[tokio::test]
    async fn test_drain_timeout_unwedges_a_hung_old_sink() {
        let connection = devnull_connection().await;

        // A gated sink suspends every export, wedging the drain.
        let (gated, gated_probe) = RecordingSink::gated();
        let _old = connection.shim().swap_exporter(Box::new(gated)).await;
        connection.enqueue(item());

        let changed = connection
            .change_connection(
                &ConnectionChange::new()
                    .endpoint("devnull:")
                    .drain_timeout(Duration::from_millis(50)),
            )
            .await;

        // The drain was abandoned at the deadline and the swap happened.
        assert!(changed);
        assert_eq!(gated_probe.export_count(), 0);

        // The revived pipeline keeps exporting.
        connection.enqueue(item());
        connection.flush().await;
    }

    #[tokio::test]
    async fn test_missing_certificate_is_not_fatal() {
        let connection = devnull_connection().await;

        // The credential read fails, is logged, and the change proceeds
        // without the certificate.
        let changed = connection
            .change_connection(
                &ConnectionChange::new()
                    .endpoint("https://collector:4318")
                    .cert_file("/nonexistent/cert.pem"),
            )
            .await;

        assert!(changed);
        let endpoint = connection.endpoint().await;
        assert_eq!(endpoint.url, "https://collector:4318");
        assert_eq!(
            endpoint.cert_file.as_deref(),
            Some(std::path::Path::new("/nonexistent/cert.pem"))
        );
    }

    #[tokio::test]
    async fn test_unparseable_certificate_rejects_the_change() {
        use std::io::Write;

        let connection = devnull_connection().await;

        let mut cert = tempfile::NamedTempFile::new().unwrap();
        cert.write_all(b"this is not pem").unwrap();

        // The file reads fine but cannot become a root certificate, so
        // sink construction fails and nothing is replaced.
        let changed = connection
            .change_connection(
                &ConnectionChange::new()
                    .endpoint("https://collector:4318")
                    .cert_file(cert.path()),
            )
            .await;

        assert!(!changed);
        assert_eq!(connection.endpoint().await.url, "devnull:");
    }

    #[tokio::test]
    async fn test_flush_failure_does_not_abort_the_change() {
        let connection = devnull_connection().await;
        let probe = instrument(&connection).await;
        probe.fail_exports(true);

        connection.enqueue(item());

        let changed = connection
            .change_connection(&ConnectionChange::new().endpoint("devnull:"))
            .await;
        assert!(changed);
    }

    #[tokio::test]
    async fn test_shutdown_is_quiet_and_final() {
        let connection = devnull_connection().await;
        let probe = instrument(&connection).await;

        connection.enqueue(item());
        connection.shutdown().await;

        assert_eq!(probe.export_count(), 1);
        assert_eq!(probe.shutdown_calls(), 1);
        assert!(connection.shim().is_shutdown());
    }
}
