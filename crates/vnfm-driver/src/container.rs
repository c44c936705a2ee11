//! Container backend: one container per component instance.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};
use vnfm_engine::{ContainerConfig, Engine, HostConfig, Mount, NetworkingConfig, PortBinding};
use vnfm_state::{InstanceConfig, MountSpec, PortSpec};

use crate::env::environment;
use crate::error::{DriverError, DriverResult};
use crate::followers::LogFollowers;
use crate::network::{aliases_for, short_name, NetworkPlan};
use crate::settings::DriverSettings;

const CAPABILITIES: &[&str] = &["NET_ADMIN", "SYS_ADMIN"];
const WILDCARD_HOST: &str = "0.0.0.0";

/// A started container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launched {
    pub id: String,
    pub name: String,
    /// Network short name → assigned address.
    pub addresses: BTreeMap<String, String>,
}

/// Container operations against one engine.
pub struct ContainerDriver {
    engine: Arc<dyn Engine>,
    settings: DriverSettings,
    followers: LogFollowers,
}

impl ContainerDriver {
    pub fn new(engine: Arc<dyn Engine>, settings: DriverSettings, followers: LogFollowers) -> Self {
        Self {
            engine,
            settings,
            followers,
        }
    }

    /// Create and start a container for `config`.
    ///
    /// Only the plan's primary network is passed at creation. The others
    /// are attached one by one after start; a failed attachment is logged
    /// and the container keeps running.
    pub async fn launch(
        &self,
        config: &InstanceConfig,
        image: &str,
        plan: &NetworkPlan,
    ) -> DriverResult<Launched> {
        let spec = container_config(config, image, plan)?;
        let name = container_name(&config.name);

        let created = self.engine.create_container(&name, &spec).await?;
        for warning in &created.warnings {
            warn!(vnfr_id = %config.vnfr_id, container_id = %created.id, %warning, "engine warning");
        }
        self.engine.start_container(&created.id).await?;

        for attachment in plan.secondaries() {
            let endpoint = attachment.endpoint(aliases_for(config, attachment));
            match self
                .engine
                .connect_network(&attachment.network_id, &created.id, &endpoint)
                .await
            {
                Ok(()) => {
                    debug!(container_id = %created.id, network = %attachment.network_name, "network attached")
                }
                Err(e) => warn!(
                    container_id = %created.id,
                    network = %attachment.network_name,
                    error = %e,
                    "secondary network attach failed"
                ),
            }
        }

        self.followers
            .follow(self.engine.clone(), &created.id, &config.name)
            .await;

        let (name, addresses) = self.inspect(&created.id).await?;
        info!(
            vnfr_id = %config.vnfr_id,
            container_id = %created.id,
            %name,
            "container started"
        );
        Ok(Launched {
            id: created.id,
            name,
            addresses,
        })
    }

    /// Stop a container and remove it without waiting for the removal.
    ///
    /// Stop failures are logged; removal failures go unreported.
    pub async fn stop_and_remove(&self, container_id: &str) {
        self.followers.cancel(container_id).await;

        if let Err(e) = self
            .engine
            .stop_container(container_id, self.settings.stop_grace())
            .await
        {
            warn!(%container_id, error = %e, "container stop failed");
        }

        let engine = self.engine.clone();
        let container_id = container_id.to_string();
        tokio::spawn(async move {
            match engine.remove_container(&container_id).await {
                Ok(()) => debug!(%container_id, "container removed"),
                Err(e) => debug!(%container_id, error = %e, "container removal failed"),
            }
        });
    }

    /// Current addresses of a container, keyed by network short name.
    pub async fn addresses(&self, container_id: &str) -> DriverResult<BTreeMap<String, String>> {
        let (_, addresses) = self.inspect(container_id).await?;
        Ok(addresses)
    }

    /// Display name and per-network addresses of a container.
    async fn inspect(&self, container_id: &str) -> DriverResult<(String, BTreeMap<String, String>)> {
        let details = self.engine.inspect_container(container_id).await?;
        let addresses = details
            .network_settings
            .networks
            .iter()
            .map(|(network, endpoint)| {
                (short_name(network).to_string(), endpoint.ip_address.clone())
            })
            .collect();
        Ok((details.display_name().to_string(), addresses))
    }
}

fn container_name(record_name: &str) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("{record_name}-{suffix}")
}

/// Body of the create call for `config`.
pub fn container_config(
    config: &InstanceConfig,
    image: &str,
    plan: &NetworkPlan,
) -> DriverResult<ContainerConfig> {
    let settings = &config.settings;

    let mut exposed_ports = BTreeMap::new();
    let mut port_bindings = BTreeMap::new();
    for spec in &settings.published_ports {
        let key = port_key(spec)?;
        let binding = PortBinding {
            host_ip: WILDCARD_HOST.to_string(),
            host_port: spec.published().unwrap_or_default().to_string(),
        };
        exposed_ports.insert(key.clone(), Default::default());
        port_bindings.insert(key, vec![binding]);
    }
    for port in &settings.exposed_ports {
        exposed_ports.insert(exposed_key(port)?, Default::default());
    }

    let mounts = settings
        .mounts
        .iter()
        .filter_map(|raw| {
            let parsed = MountSpec::parse(raw);
            if parsed.is_none() {
                warn!(vnfr_id = %config.vnfr_id, mount = %raw, "ignoring mount without target");
            }
            parsed
        })
        .map(|m| Mount::bind(&m.source, &m.target, m.read_only))
        .collect();

    let mut networking_config = NetworkingConfig::default();
    if let Some(primary) = plan.primary() {
        networking_config.endpoints_config.insert(
            primary.network_name.clone(),
            primary.endpoint(aliases_for(config, primary)),
        );
    }

    Ok(ContainerConfig {
        hostname: config.base_hostname.clone(),
        image: image.to_string(),
        cmd: settings.command.clone(),
        env: environment(config),
        exposed_ports,
        host_config: HostConfig {
            cap_add: CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            dns: settings.dns.clone(),
            mounts,
            port_bindings,
            publish_all_ports: !settings.published_ports.is_empty(),
        },
        networking_config,
    })
}

/// `"80/tcp"` for a publish spec, after checking both ports are numeric.
fn port_key(spec: &PortSpec) -> DriverResult<String> {
    let invalid = || DriverError::InvalidPort(spec.0.join(":"));
    let target = spec.target().ok_or_else(invalid)?;
    target.parse::<u16>().map_err(|_| invalid())?;
    if let Some(published) = spec.published() {
        published.parse::<u16>().map_err(|_| invalid())?;
    }
    Ok(format!("{target}/{}", spec.protocol()))
}

/// `"9000"` → `"9000/tcp"`; `"53/udp"` kept.
fn exposed_key(port: &str) -> DriverResult<String> {
    let (number, protocol) = port.split_once('/').unwrap_or((port, "tcp"));
    number
        .parse::<u16>()
        .map_err(|_| DriverError::InvalidPort(port.to_string()))?;
    Ok(format!("{number}/{protocol}"))
}
