//! Network resolution.
//!
//! Connection points name virtual links; the engine knows networks by ID.
//! Resolution maps one onto the other, skipping links the engine does not
//! know, and orders the result by interface index. The engine accepts only
//! one network when a container or service is created, so the lowest-index
//! network is the *primary* one and every other network is attached after
//! the object exists.

use std::collections::BTreeMap;

use tracing::{debug, warn};
use vnfm_catalogue::{Ip, VnfdConnectionPoint};
use vnfm_engine::{Engine, EndpointSettings, EngineError, IpamConfig, Network};
use vnfm_state::{InstanceConfig, NetConf};

use crate::error::{DriverError, DriverResult};

/// One resolved network a backend object is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub network_id: String,
    /// Engine-side network name.
    pub network_name: String,
    pub interface_id: u32,
    /// Requested fixed address, empty for engine-assigned.
    pub fixed_ip: String,
}

impl Attachment {
    pub fn short_name(&self) -> &str {
        short_name(&self.network_name)
    }

    /// Endpoint settings requesting this attachment's address and aliases.
    pub fn endpoint(&self, aliases: Vec<String>) -> EndpointSettings {
        let ipam_config = (!self.fixed_ip.is_empty()).then(|| IpamConfig {
            ipv4_address: self.fixed_ip.clone(),
        });
        EndpointSettings {
            ipam_config,
            aliases,
            network_id: self.network_id.clone(),
            ip_address: self.fixed_ip.clone(),
        }
    }
}

/// Networks and connection-point data for one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkPlan {
    /// Resolved networks, in connection-point order.
    pub attachments: Vec<Attachment>,
    /// Connection points as reported on component instances.
    pub connection_points: Vec<VnfdConnectionPoint>,
    /// Fixed addresses declared by the connection points.
    pub ips: Vec<Ip>,
    /// Upper-cased virtual-link name → fixed address.
    pub fixed_env: BTreeMap<String, String>,
}

impl NetworkPlan {
    /// The attachment with the lowest interface index; the first one wins
    /// a tie.
    pub fn primary(&self) -> Option<&Attachment> {
        self.primary_index().map(|i| &self.attachments[i])
    }

    /// Every attachment except the primary one.
    pub fn secondaries(&self) -> impl Iterator<Item = &Attachment> {
        let primary = self.primary_index();
        self.attachments
            .iter()
            .enumerate()
            .filter(move |(i, _)| Some(*i) != primary)
            .map(|(_, a)| a)
    }

    fn primary_index(&self) -> Option<usize> {
        self.attachments
            .iter()
            .enumerate()
            .min_by_key(|(_, a)| a.interface_id)
            .map(|(i, _)| i)
    }

    /// Cache the resolved networks and fixed-address entries in `config`.
    pub fn merge_into(&self, config: &mut InstanceConfig) {
        for attachment in &self.attachments {
            let conf = config
                .networks
                .entry(attachment.network_id.clone())
                .or_insert_with(NetConf::default);
            if !attachment.fixed_ip.is_empty() {
                conf.ipv4_address = attachment.fixed_ip.clone();
            }
        }
        for (key, ip) in &self.fixed_env {
            config.settings.own.insert(key.clone(), ip.clone());
        }
    }
}

/// Resolve a component's connection points against the engine.
///
/// A point that already carries a network ID is checked with an inspect
/// call and fails with [`DriverError::NetworkNotFound`] if the engine does
/// not know it. A point without one is looked up by name in the engine's
/// network list; a miss is logged and the point is left unresolved.
pub async fn resolve_points(
    engine: &dyn Engine,
    points: &[VnfdConnectionPoint],
) -> DriverResult<NetworkPlan> {
    let mut plan = NetworkPlan::default();
    let mut listed: Option<Vec<Network>> = None;

    for cp in points {
        let resolved = if cp.virtual_link_reference_id.is_empty() {
            if listed.is_none() {
                listed = Some(engine.list_networks().await?);
            }
            listed
                .iter()
                .flatten()
                .find(|n| n.name == cp.virtual_link_reference)
                .cloned()
        } else {
            Some(inspect(engine, &cp.virtual_link_reference_id).await?)
        };

        let (network_id, network_name) = match resolved {
            Some(network) => {
                debug!(link = %cp.virtual_link_reference, network_id = %network.id, "virtual link resolved");
                plan.attachments.push(Attachment {
                    network_id: network.id.clone(),
                    network_name: network.name.clone(),
                    interface_id: cp.interface_id,
                    fixed_ip: cp.fixed_ip.clone(),
                });
                (network.id, network.name)
            }
            None => {
                warn!(link = %cp.virtual_link_reference, "no engine network for virtual link, skipping");
                (String::new(), cp.virtual_link_reference.clone())
            }
        };

        plan.connection_points.push(VnfdConnectionPoint {
            virtual_link_reference: network_name,
            virtual_link_reference_id: network_id,
            interface_id: cp.interface_id,
            fixed_ip: cp.fixed_ip.clone(),
            chosen_pool: cp.chosen_pool.clone(),
            floating_ip: "random".to_string(),
            cp_type: "docker".to_string(),
        });

        if !cp.fixed_ip.is_empty() {
            plan.ips
                .push(Ip::new(&cp.virtual_link_reference, &cp.fixed_ip));
            plan.fixed_env
                .insert(cp.virtual_link_reference.to_uppercase(), cp.fixed_ip.clone());
        }
    }

    Ok(plan)
}

/// Attachments for launching one component instance.
///
/// Covers every network cached in `config`; the instance's connection
/// points only decide the ordering, networks they do not mention sort last.
pub async fn for_launch(
    engine: &dyn Engine,
    config: &InstanceConfig,
    instance_points: &[VnfdConnectionPoint],
) -> DriverResult<NetworkPlan> {
    let mut plan = NetworkPlan::default();
    for (network_id, conf) in &config.networks {
        let network = inspect(engine, network_id).await?;
        let interface_id = instance_points
            .iter()
            .find(|cp| {
                cp.virtual_link_reference_id == *network_id
                    || cp.virtual_link_reference == network.name
            })
            .map_or(u32::MAX, |cp| cp.interface_id);
        plan.attachments.push(Attachment {
            network_id: network.id,
            network_name: network.name,
            interface_id,
            fixed_ip: conf.ipv4_address.clone(),
        });
    }
    Ok(plan)
}

async fn inspect(engine: &dyn Engine, network_id: &str) -> DriverResult<Network> {
    engine.inspect_network(network_id).await.map_err(|e| match e {
        EngineError::NotFound(_) => DriverError::NetworkNotFound(network_id.to_string()),
        other => other.into(),
    })
}

/// Engine network name without its last `_suffix`.
pub fn short_name(network_name: &str) -> &str {
    match network_name.rsplit_once('_') {
        Some((head, _)) if !head.is_empty() => head,
        _ => network_name,
    }
}

/// Aliases for the record on one network.
///
/// An explicit override, keyed by short or full network name, wins.
/// Otherwise `{name}.{network}` and the bare record name.
pub fn aliases_for(config: &InstanceConfig, attachment: &Attachment) -> Vec<String> {
    let short = attachment.short_name();
    config
        .aliases
        .get(short)
        .or_else(|| config.aliases.get(&attachment.network_name))
        .cloned()
        .unwrap_or_else(|| vec![format!("{}.{short}", config.name), config.name.clone()])
}
