//! TLS configuration and certificate loading.

use axum_server::tls_rustls::RustlsConfig;
use std::path::Path;

use crate::config::schema::TlsConfig;

/// Load TLS configuration from PEM certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    for (what, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{what} file not found: {}", path.display()),
            ));
        }
    }
    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Load the listener's TLS material, if TLS is configured.
pub async fn from_listener(tls: Option<&TlsConfig>) -> Result<Option<RustlsConfig>, std::io::Error> {
    match tls {
        Some(tls) => {
            let config = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            tracing::info!(cert = %tls.cert_path, "TLS enabled");
            Ok(Some(config))
        }
        None => Ok(None),
    }
}
