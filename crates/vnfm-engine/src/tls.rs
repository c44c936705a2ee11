//! TLS client material for remote engines.
//!
//! The credential directory holds `ca.pem`, `cert.pem` and `key.pem`. The
//! CA bundle is the only trust root; peer verification is always on.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

pub const CA_FILE: &str = "ca.pem";
pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// Build a mutual-TLS client configuration from a credential directory.
pub fn load_client_config(cert_dir: &Path) -> EngineResult<Arc<rustls::ClientConfig>> {
    let ca = read_certs(&cert_dir.join(CA_FILE))?;
    let chain = read_certs(&cert_dir.join(CERT_FILE))?;
    let key = read_key(&cert_dir.join(KEY_FILE))?;

    let mut roots = rustls::RootCertStore::empty();
    for cert in ca {
        roots
            .add(cert)
            .map_err(|e| EngineError::Tls(format!("invalid CA certificate: {e}")))?;
    }

    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| EngineError::Tls(format!("tls protocol version error: {e}")))?
    .with_root_certificates(roots)
    .with_client_auth_cert(chain, key)
    .map_err(|e| EngineError::Tls(format!("invalid client certificate: {e}")))?;

    debug!(dir = ?cert_dir, "engine tls material loaded");
    Ok(Arc::new(config))
}

fn open(path: &Path) -> EngineResult<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| EngineError::Tls(format!("cannot read {}: {e}", path.display())))?;
    Ok(BufReader::new(file))
}

fn read_certs(path: &Path) -> EngineResult<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::Tls(format!("bad PEM in {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(EngineError::Tls(format!(
            "no certificate in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> EngineResult<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| EngineError::Tls(format!("bad PEM in {}: {e}", path.display())))?
        .ok_or_else(|| EngineError::Tls(format!("no private key in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_is_tls_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_client_config(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, EngineError::Tls(msg) if msg.contains("ca.pem")));
    }

    #[test]
    fn pem_without_certificates_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CA_FILE), "not a pem file\n").unwrap();

        let err = load_client_config(dir.path()).unwrap_err();
        assert!(matches!(err, EngineError::Tls(msg) if msg.contains("no certificate")));
    }
}
