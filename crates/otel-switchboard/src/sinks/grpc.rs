//! OTLP/gRPC sink.
//!
//! One lazily-connected tonic channel per sink; the signal's generated
//! service client is created per call from a cheap channel clone. Bearer
//! tokens travel as `authorization` metadata.

use crate::sink::{SignalBatch, SignalSink, SinkError};
use crate::sinks::SinkTarget;
use async_trait::async_trait;
use otel_switchboard_config::EndpointScheme;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Certificate, Channel, ClientTlsConfig};

/// OTLP exporter over gRPC.
///
/// The channel is shared by every signal's generated client, so one struct
/// serves all three batch types.
pub struct OtlpGrpcSink {
    channel: Channel,
    auth: Option<AsciiMetadataValue>,
}

impl OtlpGrpcSink {
    /// Creates a sink for the target.
    ///
    /// The channel connects lazily: construction never touches the network,
    /// so a connection change cannot block here.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid gRPC URI, the certificate
    /// does not parse, or the auth token is not valid header material.
    pub fn new(target: &SinkTarget) -> Result<Self, SinkError> {
        let uri = grpc_uri(&target.url, target.scheme)?;

        let mut endpoint = Channel::from_shared(uri)
            .map_err(|e| SinkError::invalid_target(format!("bad gRPC URI: {e}")))?
            .timeout(target.timeout)
            .connect_timeout(target.timeout);

        if target.scheme == EndpointScheme::Grpcs {
            let mut tls = ClientTlsConfig::new().with_native_roots();
            if let Some(pem) = &target.cert_pem {
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| SinkError::invalid_target(format!("bad TLS config: {e}")))?;
        }

        let auth = target
            .auth_token
            .as_ref()
            .map(|token| {
                AsciiMetadataValue::try_from(format!("Bearer {token}"))
                    .map_err(|e| SinkError::invalid_target(format!("bad auth token: {e}")))
            })
            .transpose()?;

        Ok(Self {
            channel: endpoint.connect_lazy(),
            auth,
        })
    }
}

#[async_trait]
impl<T: SignalBatch> SignalSink<T> for OtlpGrpcSink {
    async fn export(&self, batch: T) -> Result<(), SinkError> {
        let mut request = tonic::Request::new(batch);

        if let Some(auth) = &self.auth {
            request.metadata_mut().insert("authorization", auth.clone());
        }

        T::export_grpc(self.channel.clone(), request)
            .await
            .map_err(SinkError::Grpc)
    }

    async fn force_flush(&self) -> Result<(), SinkError> {
        // Each export awaits its RPC; nothing is buffered client-side.
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), SinkError> {
        // Dropping the last channel clone closes the connection.
        Ok(())
    }
}

/// Maps a `grpc://`/`grpcs://` URL onto the `http`/`https` URI tonic wants.
fn grpc_uri(url: &str, scheme: EndpointScheme) -> Result<String, SinkError> {
    let rest = url
        .split_once("://")
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
        .ok_or_else(|| SinkError::invalid_target(format!("no authority in {url}")))?;

    let transport = match scheme {
        EndpointScheme::Grpcs => "https",
        _ => "http",
    };

    Ok(format!("{transport}://{rest}"))
}
