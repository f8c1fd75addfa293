//! TLS credential loading.

use std::path::Path;

/// Reads a PEM certificate file for a TLS endpoint.
///
/// This never fails outward: an unreadable file is logged as a warning and
/// `None` is returned, so a missing certificate degrades the connection to
/// system roots instead of aborting a connection change.
pub async fn read_cert_file(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.is_empty() => {
            tracing::warn!(path = %path.display(), "certificate file is empty, ignoring");
            None
        }
        Ok(bytes) => Some(bytes),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read certificate file, proceeding without it"
            );
            None
        }
    }
}
