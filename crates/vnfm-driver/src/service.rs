//! Service backend: one replicated service per deployment unit.
//!
//! A service moves through `created → addressed → scaled* → removed`.
//! Creation blocks until the engine has assigned a virtual address, polling
//! at a fixed interval for a bounded number of attempts. Updates are
//! optimistic: every submission carries the version read immediately
//! before it, and a version conflict triggers a fresh read instead of a
//! blind retry.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use vnfm_catalogue::Ip;
use vnfm_engine::{
    Engine, EndpointSpec, EngineError, Mount, NetworkAttachment, Placement, PortConfig,
    RestartPolicySpec, Service, ServiceContainerSpec, ServiceMode, ServiceSpec, TaskSpec,
};
use vnfm_state::{InstanceConfig, MountSpec, PortSpec, RestartPolicy};

use crate::env::environment;
use crate::error::{DriverError, DriverResult};
use crate::network::{aliases_for, NetworkPlan};
use crate::settings::DriverSettings;

/// The mutable part of a service spec.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceUpdate {
    pub replicas: u64,
    pub env: Vec<String>,
    pub mounts: Vec<Mount>,
    pub constraints: Vec<String>,
    pub restart_policy: RestartPolicy,
}

impl ServiceUpdate {
    /// Update carrying the record's current environment and settings.
    pub fn for_config(config: &InstanceConfig, replicas: u64) -> Self {
        let mounts = config
            .settings
            .mounts
            .iter()
            .filter_map(|raw| MountSpec::parse(raw))
            .map(|m| Mount::bind(&m.source, &m.target, m.read_only))
            .collect();
        Self {
            replicas,
            env: environment(config),
            mounts,
            constraints: config.settings.constraints.clone(),
            restart_policy: config.settings.restart_policy,
        }
    }

    /// `current` with this update applied. Image, hostname, command,
    /// networks, ports and name are kept.
    pub fn apply(&self, current: &ServiceSpec) -> ServiceSpec {
        let mut spec = current.clone();
        spec.mode = ServiceMode::replicated(self.replicas);
        spec.task_template.container_spec.env = self.env.clone();
        spec.task_template.container_spec.mounts = self.mounts.clone();
        spec.task_template.placement = Some(Placement {
            constraints: self.constraints.clone(),
        });
        spec.task_template.restart_policy = Some(RestartPolicySpec {
            condition: self.restart_policy.as_str().to_string(),
            max_attempts: 0,
        });
        spec
    }
}

/// Service operations against one engine.
pub struct ServiceDriver {
    engine: Arc<dyn Engine>,
    settings: DriverSettings,
}

impl ServiceDriver {
    pub fn new(engine: Arc<dyn Engine>, settings: DriverSettings) -> Self {
        Self { engine, settings }
    }

    /// Submit a new service; returns its identifier without waiting for
    /// an address.
    pub async fn create(
        &self,
        config: &InstanceConfig,
        image: &str,
        plan: &NetworkPlan,
        replicas: u64,
    ) -> DriverResult<String> {
        let spec = service_spec(config, image, plan, replicas)?;
        let service_id = self.engine.create_service(&spec).await?;
        info!(vnfr_id = %config.vnfr_id, %service_id, replicas, "service created");
        Ok(service_id)
    }

    /// Poll until the service has an address.
    ///
    /// Inspects at most `service_poll_attempts` times. A failed inspection
    /// counts as an attempt.
    pub async fn wait_for_address(&self, service_id: &str) -> DriverResult<Service> {
        let attempts = self.settings.service_poll_attempts;
        for attempt in 1..=attempts {
            match self.engine.inspect_service(service_id).await {
                Ok(service) if service.has_address() => {
                    debug!(%service_id, attempt, "service addressed");
                    return Ok(service);
                }
                Ok(_) => {}
                Err(e) => debug!(%service_id, attempt, error = %e, "service inspect failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.settings.poll_interval()).await;
            }
        }
        warn!(%service_id, attempts, "service address polling exhausted");
        Err(DriverError::Timeout {
            service: service_id.to_string(),
            attempts,
        })
    }

    /// Apply `update`, re-reading the version before every submission.
    ///
    /// Returns the service as read back after the update. Gives up with
    /// [`DriverError::Conflict`] once `update_attempts` submissions have
    /// been rejected as stale.
    pub async fn update(&self, service_id: &str, update: &ServiceUpdate) -> DriverResult<Service> {
        let attempts = self.settings.update_attempts.max(1);
        for attempt in 1..=attempts {
            let current = self.engine.inspect_service(service_id).await?;
            let version = current.version.index;
            let spec = update.apply(&current.spec);

            match self.engine.update_service(service_id, version, &spec).await {
                Ok(()) => {
                    info!(%service_id, version, replicas = update.replicas, "service updated");
                    return Ok(self.engine.inspect_service(service_id).await?);
                }
                Err(EngineError::VersionConflict(msg)) => {
                    warn!(%service_id, version, attempt, %msg, "service changed underneath update, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(DriverError::Conflict(format!(
            "service {service_id} kept changing across {attempts} update attempts"
        )))
    }

    /// Delete a service. An already absent service is not an error.
    pub async fn remove(&self, service_id: &str) -> DriverResult<()> {
        match self.engine.remove_service(service_id).await {
            Ok(()) => {
                info!(%service_id, "service removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(%service_id, "service already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The service's virtual addresses, by engine network name.
    pub async fn addresses(&self, service: &Service) -> DriverResult<Vec<Ip>> {
        let names: HashMap<String, String> = self
            .engine
            .list_networks()
            .await?
            .into_iter()
            .map(|n| (n.id, n.name))
            .collect();

        let mut ips = Vec::new();
        for vip in &service.endpoint.virtual_ips {
            if vip.ip().is_empty() {
                continue;
            }
            let name = names
                .get(&vip.network_id)
                .ok_or_else(|| DriverError::NetworkNotFound(vip.network_id.clone()))?;
            ips.push(Ip::new(name, vip.ip()));
        }
        Ok(ips)
    }
}

/// Create body for `config`. The primary network is listed first.
pub fn service_spec(
    config: &InstanceConfig,
    image: &str,
    plan: &NetworkPlan,
    replicas: u64,
) -> DriverResult<ServiceSpec> {
    let settings = &config.settings;

    let networks = plan
        .primary()
        .into_iter()
        .chain(plan.secondaries())
        .map(|a| NetworkAttachment {
            target: a.network_id.clone(),
            aliases: aliases_for(config, a),
        })
        .collect();

    let ports = settings
        .published_ports
        .iter()
        .map(port_config)
        .collect::<DriverResult<Vec<_>>>()?;

    Ok(ServiceSpec {
        name: config.base_hostname.clone(),
        task_template: TaskSpec {
            container_spec: ServiceContainerSpec {
                image: image.to_string(),
                hostname: config.base_hostname.clone(),
                command: settings.command.clone(),
                ..Default::default()
            },
            networks,
            placement: (!settings.constraints.is_empty()).then(|| Placement {
                constraints: settings.constraints.clone(),
            }),
            restart_policy: None,
        },
        mode: ServiceMode::replicated(replicas),
        endpoint_spec: (!ports.is_empty()).then_some(EndpointSpec { ports }),
    })
}

fn port_config(spec: &PortSpec) -> DriverResult<PortConfig> {
    let invalid = || DriverError::InvalidPort(spec.0.join(":"));
    let target_port = spec
        .target()
        .ok_or_else(invalid)?
        .parse::<u32>()
        .map_err(|_| invalid())?;
    let published_port = match spec.published() {
        Some(port) => port.parse::<u32>().map_err(|_| invalid())?,
        None => 0,
    };
    Ok(PortConfig {
        protocol: spec.protocol().to_string(),
        target_port,
        published_port,
    })
}
