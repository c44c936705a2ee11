//! Building engine handles from venue credentials.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;
use vnfm_catalogue::VimInstance;

use crate::docker::{DockerEngine, Endpoint};
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::tls;

/// Produces an [`Engine`] for a venue credential.
///
/// The lifecycle controller only ever holds a connector; it never builds a
/// transport itself.
pub trait EngineConnector: Send + Sync {
    fn connect(&self, venue: &VimInstance) -> EngineResult<Arc<dyn Engine>>;
}

/// Connector for Docker daemons.
///
/// Unix-socket venues are always reached in plaintext. TCP venues use TLS
/// when a credential directory was configured; the material is read on
/// each connect so rotated certificates are picked up.
#[derive(Debug, Clone, Default)]
pub struct DockerConnector {
    cert_dir: Option<PathBuf>,
}

impl DockerConnector {
    /// Plaintext connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector that secures TCP venues with the material in `cert_dir`.
    pub fn with_tls(cert_dir: PathBuf) -> Self {
        Self {
            cert_dir: Some(cert_dir),
        }
    }

    pub fn tls_enabled(&self) -> bool {
        self.cert_dir.is_some()
    }
}

impl EngineConnector for DockerConnector {
    fn connect(&self, venue: &VimInstance) -> EngineResult<Arc<dyn Engine>> {
        let endpoint = Endpoint::parse(&venue.auth_url, self.tls_enabled())?;
        let tls_config = match (&endpoint, &self.cert_dir) {
            (Endpoint::Tcp { .. }, Some(dir)) => Some(tls::load_client_config(dir)?),
            _ => None,
        };
        debug!(venue = %venue.id, ?endpoint, tls = tls_config.is_some(), "engine handle built");
        Ok(Arc::new(DockerEngine::new(endpoint, tls_config)))
    }
}
