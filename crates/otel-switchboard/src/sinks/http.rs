//! OTLP/HTTP sink.
//!
//! Posts prost-encoded request bodies to the signal's `/v1/<signal>` path
//! with optional gzip compression and bearer-token auth. The sink itself
//! never retries; retry policy belongs to whatever wraps it.

use crate::sink::{SignalBatch, SignalSink, SinkError};
use crate::sinks::SinkTarget;
use async_trait::async_trait;
use otel_switchboard_config::SignalKind;
use prost::Message;
use reqwest::Client;
use std::io::Write;
use std::marker::PhantomData;

const CONTENT_TYPE: &str = "application/x-protobuf";

/// OTLP exporter over HTTP for one signal kind.
pub struct OtlpHttpSink<T> {
    client: Client,
    url: String,
    auth_token: Option<String>,
    gzip: bool,
    _signal: PhantomData<fn() -> T>,
}

impl<T: SignalBatch> OtlpHttpSink<T> {
    /// Creates a sink posting to the target's URL.
    ///
    /// A base URL without a path gets the signal's standard `/v1/<signal>`
    /// suffix appended; a URL that already carries a path is used as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the
    /// certificate does not parse.
    pub fn new(target: &SinkTarget) -> Result<Self, SinkError> {
        let mut builder = Client::builder().timeout(target.timeout);

        if let Some(pem) = &target.cert_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| SinkError::invalid_target(format!("bad certificate: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder.build().map_err(SinkError::Http)?;

        Ok(Self {
            client,
            url: signal_url(&target.url, T::SIGNAL),
            auth_token: target.auth_token.clone(),
            gzip: target.gzip,
            _signal: PhantomData,
        })
    }

    /// Returns the full per-signal URL this sink posts to.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn encode_body(&self, batch: &T) -> Result<Vec<u8>, SinkError> {
        let mut buf = Vec::with_capacity(batch.encoded_len());
        batch.encode(&mut buf).map_err(SinkError::encode)?;

        if self.gzip {
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&buf).map_err(SinkError::encode)?;
            encoder.finish().map_err(SinkError::encode)
        } else {
            Ok(buf)
        }
    }
}

#[async_trait]
impl<T: SignalBatch> SignalSink<T> for OtlpHttpSink<T> {
    async fn export(&self, batch: T) -> Result<(), SinkError> {
        let body = self.encode_body(&batch)?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", CONTENT_TYPE)
            .body(body);

        if self.gzip {
            request = request.header("Content-Encoding", "gzip");
        }

        if let Some(token) = &self.auth_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = request.send().await.map_err(SinkError::Http)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::status(status.as_u16(), body))
        }
    }

    async fn force_flush(&self) -> Result<(), SinkError> {
        // Every export is posted immediately; there is nothing buffered.
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SinkError> {
        // Connection pools close when the client drops.
        Ok(())
    }
}

/// Appends the signal path to a base URL that does not already carry one.
fn signal_url(base: &str, signal: SignalKind) -> String {
    let trimmed = base.trim_end_matches('/');
    let has_path = trimmed
        .split_once("://")
        .is_some_and(|(_, rest)| rest.contains('/'));

    if has_path {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, signal.http_path())
    }
}
