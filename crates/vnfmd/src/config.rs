//! vnfmd.toml configuration, overlaid by command-line flags.
//!
//! ```toml
//! [daemon]
//! level = "info"
//! persist = true
//! dir = "/var/lib/vnfm"
//! swarm = false
//! tls = true
//! cert = "/etc/vnfm/certs"
//! port = 8080
//!
//! [driver]
//! service_poll_interval_ms = 5
//! service_poll_attempts = 10000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vnfm_driver::DriverSettings;
use vnfm_state::BackendKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VnfmConfig {
    pub daemon: DaemonConfig,
    pub driver: DriverSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Name reported by `/healthz`.
    pub name: String,
    pub level: String,
    /// Keep records on disk; otherwise they live in memory.
    pub persist: bool,
    pub dir: PathBuf,
    /// Realize new records as replicated services instead of containers.
    pub swarm: bool,
    /// Reach TCP venues over TLS with the material in `cert`.
    pub tls: bool,
    pub cert: PathBuf,
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            name: "docker".to_string(),
            level: "info".to_string(),
            persist: true,
            dir: PathBuf::from("vnfm-data"),
            swarm: false,
            tls: false,
            cert: PathBuf::from("certs"),
            port: 8080,
        }
    }
}

/// Command-line values; `None` keeps what the file (or default) says.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub level: Option<String>,
    pub persist: Option<bool>,
    pub dir: Option<PathBuf>,
    pub swarm: Option<bool>,
    pub cert: Option<PathBuf>,
    pub tls: Option<bool>,
    pub port: Option<u16>,
}

impl VnfmConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: VnfmConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// The file at `path` if one was given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

impl DaemonConfig {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(level) = overrides.level {
            self.level = level;
        }
        if let Some(persist) = overrides.persist {
            self.persist = persist;
        }
        if let Some(dir) = overrides.dir {
            self.dir = dir;
        }
        if let Some(swarm) = overrides.swarm {
            self.swarm = swarm;
        }
        if let Some(cert) = overrides.cert {
            self.cert = cert;
        }
        if let Some(tls) = overrides.tls {
            self.tls = tls;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
    }

    pub fn backend(&self) -> BackendKind {
        if self.swarm {
            BackendKind::Service
        } else {
            BackendKind::Container
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.join("vnfm.redb")
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Default tracing directives for the configured level.
    pub fn log_directives(&self) -> String {
        let level = self.level.to_lowercase();
        format!("{level},vnfmd={level},vnfm_driver={level},vnfm_engine={level}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: VnfmConfig = toml::from_str("").unwrap();
        assert_eq!(config, VnfmConfig::default());
        assert_eq!(config.driver.service_poll_attempts, 10_000);
        assert_eq!(config.daemon.backend(), BackendKind::Container);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config: VnfmConfig = toml::from_str(
            r#"
[daemon]
swarm = true
port = 9000

[driver]
update_attempts = 7
"#,
        )
        .unwrap();
        assert_eq!(config.daemon.backend(), BackendKind::Service);
        assert_eq!(config.daemon.port, 9000);
        assert!(config.daemon.persist);
        assert_eq!(config.driver.update_attempts, 7);
        assert_eq!(config.driver.stop_grace_secs, 10);
    }

    #[test]
    fn flags_override_the_file() {
        let mut daemon = DaemonConfig {
            port: 9000,
            ..Default::default()
        };
        daemon.apply(Overrides {
            persist: Some(false),
            level: Some("DEBUG".into()),
            ..Default::default()
        });
        assert!(!daemon.persist);
        assert_eq!(daemon.port, 9000);
        assert!(daemon.log_directives().starts_with("debug,"));
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vnfmd.toml");
        std::fs::write(&path, "[daemon]\ndir = \"/tmp/records\"\n").unwrap();

        let config = VnfmConfig::load(Some(&path)).unwrap();
        assert_eq!(config.daemon.store_path(), PathBuf::from("/tmp/records/vnfm.redb"));
        assert!(VnfmConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
