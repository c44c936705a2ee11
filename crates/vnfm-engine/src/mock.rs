//! In-process engine double.
//!
//! `MockEngine` keeps networks, containers and services in memory, records
//! every call in order and can be told to misbehave: delay or withhold
//! service addresses, race service updates with a concurrent writer, or
//! fail network attachment.

use std::collections::{BTreeMap, BTreeSet};
use std::future::ready;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use vnfm_catalogue::VimInstance;

use crate::connector::EngineConnector;
use crate::engine::{Engine, EngineFuture, LogStream};
use crate::error::{EngineError, EngineResult};
use crate::model::*;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    ListNetworks,
    InspectNetwork(String),
    ConnectNetwork {
        network_id: String,
        container_id: String,
        endpoint: EndpointSettings,
    },
    ListImages,
    CreateContainer {
        name: String,
        config: ContainerConfig,
    },
    StartContainer(String),
    StopContainer(String),
    RemoveContainer(String),
    InspectContainer(String),
    ContainerLogs(String),
    CreateService(ServiceSpec),
    InspectService(String),
    UpdateService {
        id: String,
        version: u64,
        spec: ServiceSpec,
    },
    RemoveService(String),
}

#[derive(Debug, Clone)]
struct MockContainer {
    name: String,
    running: bool,
    /// Network name → endpoint.
    networks: BTreeMap<String, EndpointSettings>,
}

#[derive(Debug, Default)]
struct MockState {
    networks: Vec<Network>,
    images: Vec<ImageSummary>,
    containers: BTreeMap<String, MockContainer>,
    services: BTreeMap<String, Service>,
    /// Addresses a service receives once the engine "assigns" them.
    pending_vips: BTreeMap<String, Vec<VirtualIp>>,
    inspections: BTreeMap<String, u32>,
    address_after: u32,
    never_address: bool,
    interleaved_writes: u32,
    failing_networks: BTreeSet<String>,
    fail_network_list: bool,
    log_lines: Vec<String>,
    next_id: u64,
    next_host: u32,
    calls: Vec<EngineCall>,
}

impl MockState {
    fn network(&self, key: &str) -> Option<Network> {
        self.networks
            .iter()
            .find(|n| n.id == key || n.name == key)
            .cloned()
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn next_ip(&mut self) -> String {
        self.next_host += 1;
        format!("172.20.{}.{}", self.next_host / 250, self.next_host % 250 + 2)
    }
}

#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Setup ──────────────────────────────────────────────────────

    pub fn with_network(mut self, id: &str, name: &str) -> Self {
        self.state_mut().networks.push(Network {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn with_image(mut self, id: &str, tags: &[&str]) -> Self {
        self.state_mut().images.push(ImageSummary {
            id: id.to_string(),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    /// The first `polls` inspections of a new service report no address.
    pub fn address_after(mut self, polls: u32) -> Self {
        self.state_mut().address_after = polls;
        self
    }

    /// Services never receive an address.
    pub fn never_address(mut self) -> Self {
        self.state_mut().never_address = true;
        self
    }

    /// A concurrent writer bumps the service version right before each of
    /// the next `writes` update submissions.
    pub fn interleave_writes(mut self, writes: u32) -> Self {
        self.state_mut().interleaved_writes = writes;
        self
    }

    /// Attaching anything to `network_id` after creation fails.
    pub fn fail_connect(mut self, network_id: &str) -> Self {
        self.state_mut()
            .failing_networks
            .insert(network_id.to_string());
        self
    }

    pub fn fail_network_list(mut self) -> Self {
        self.state_mut().fail_network_list = true;
        self
    }

    pub fn with_logs(mut self, lines: &[&str]) -> Self {
        self.state_mut().log_lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    // ── Inspection ─────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn service(&self, id: &str) -> Option<Service> {
        self.lock().services.get(id).cloned()
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.lock().services.keys().cloned().collect()
    }

    pub fn container_ids(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.lock().containers.get(id).is_some_and(|c| c.running)
    }

    /// Network names a container is attached to.
    pub fn attached_networks(&self, id: &str) -> Vec<String> {
        self.lock()
            .containers
            .get(id)
            .map(|c| c.networks.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, call: EngineCall) -> MutexGuard<'_, MockState> {
        let mut state = self.lock();
        state.calls.push(call);
        state
    }
}

fn done<'a, T: Send + 'a>(result: EngineResult<T>) -> EngineFuture<'a, T> {
    Box::pin(ready(result))
}

fn not_found(what: &str, id: &str) -> EngineError {
    EngineError::NotFound(format!("no such {what}: {id}"))
}

impl Engine for MockEngine {
    fn list_networks(&self) -> EngineFuture<'_, Vec<Network>> {
        let state = self.record(EngineCall::ListNetworks);
        if state.fail_network_list {
            return done(Err(EngineError::Transport("network list unavailable".into())));
        }
        done(Ok(state.networks.clone()))
    }

    fn inspect_network<'a>(&'a self, id: &'a str) -> EngineFuture<'a, Network> {
        let state = self.record(EngineCall::InspectNetwork(id.to_string()));
        done(state.network(id).ok_or_else(|| not_found("network", id)))
    }

    fn connect_network<'a>(
        &'a self,
        network_id: &'a str,
        container_id: &'a str,
        endpoint: &'a EndpointSettings,
    ) -> EngineFuture<'a, ()> {
        let mut state = self.record(EngineCall::ConnectNetwork {
            network_id: network_id.to_string(),
            container_id: container_id.to_string(),
            endpoint: endpoint.clone(),
        });
        if state.failing_networks.contains(network_id) {
            return done(Err(EngineError::Api {
                status: 500,
                message: format!("cannot attach to {network_id}"),
            }));
        }
        let Some(network) = state.network(network_id) else {
            return done(Err(not_found("network", network_id)));
        };
        let ip = match endpoint.ipam_config.as_ref() {
            Some(ipam) if !ipam.ipv4_address.is_empty() => ipam.ipv4_address.clone(),
            _ => state.next_ip(),
        };
        let Some(container) = state.containers.get_mut(container_id) else {
            return done(Err(not_found("container", container_id)));
        };
        container.networks.insert(
            network.name.clone(),
            EndpointSettings {
                network_id: network.id,
                ip_address: ip,
                aliases: endpoint.aliases.clone(),
                ..Default::default()
            },
        );
        done(Ok(()))
    }

    fn list_images(&self) -> EngineFuture<'_, Vec<ImageSummary>> {
        let state = self.record(EngineCall::ListImages);
        done(Ok(state.images.clone()))
    }

    fn create_container<'a>(
        &'a self,
        name: &'a str,
        config: &'a ContainerConfig,
    ) -> EngineFuture<'a, Created> {
        let mut state = self.record(EngineCall::CreateContainer {
            name: name.to_string(),
            config: config.clone(),
        });
        let mut networks = BTreeMap::new();
        for (key, endpoint) in &config.networking_config.endpoints_config {
            let Some(network) = state.network(key) else {
                return done(Err(not_found("network", key)));
            };
            let ip = match endpoint.ipam_config.as_ref() {
                Some(ipam) if !ipam.ipv4_address.is_empty() => ipam.ipv4_address.clone(),
                _ => state.next_ip(),
            };
            networks.insert(
                network.name.clone(),
                EndpointSettings {
                    network_id: network.id,
                    ip_address: ip,
                    aliases: endpoint.aliases.clone(),
                    ..Default::default()
                },
            );
        }
        let id = state.next_id("c");
        state.containers.insert(
            id.clone(),
            MockContainer {
                name: name.to_string(),
                running: false,
                networks,
            },
        );
        done(Ok(Created {
            id,
            warnings: Vec::new(),
        }))
    }

    fn start_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()> {
        let mut state = self.record(EngineCall::StartContainer(id.to_string()));
        done(match state.containers.get_mut(id) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(not_found("container", id)),
        })
    }

    fn stop_container<'a>(&'a self, id: &'a str, _grace: Duration) -> EngineFuture<'a, ()> {
        let mut state = self.record(EngineCall::StopContainer(id.to_string()));
        done(match state.containers.get_mut(id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(not_found("container", id)),
        })
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()> {
        let mut state = self.record(EngineCall::RemoveContainer(id.to_string()));
        done(match state.containers.remove(id) {
            Some(_) => Ok(()),
            None => Err(not_found("container", id)),
        })
    }

    fn inspect_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ContainerDetails> {
        let state = self.record(EngineCall::InspectContainer(id.to_string()));
        done(match state.containers.get(id) {
            Some(container) => Ok(ContainerDetails {
                id: id.to_string(),
                name: format!("/{}", container.name),
                network_settings: NetworkSettings {
                    networks: container.networks.clone(),
                },
            }),
            None => Err(not_found("container", id)),
        })
    }

    fn container_logs<'a>(&'a self, id: &'a str) -> EngineFuture<'a, LogStream> {
        let state = self.record(EngineCall::ContainerLogs(id.to_string()));
        if !state.containers.contains_key(id) {
            return done(Err(not_found("container", id)));
        }
        let (tx, rx) = mpsc::channel(state.log_lines.len().max(1));
        for line in &state.log_lines {
            let _ = tx.try_send(line.clone());
        }
        done(Ok(rx))
    }

    fn create_service<'a>(&'a self, spec: &'a ServiceSpec) -> EngineFuture<'a, String> {
        let mut state = self.record(EngineCall::CreateService(spec.clone()));
        let id = state.next_id("s");
        let mut vips = Vec::new();
        for attachment in &spec.task_template.networks {
            let host = state.next_ip();
            vips.push(VirtualIp {
                network_id: attachment.target.clone(),
                addr: format!("{host}/16"),
            });
        }
        state.pending_vips.insert(id.clone(), vips);
        state.services.insert(
            id.clone(),
            Service {
                id: id.clone(),
                version: ObjectVersion { index: 1 },
                spec: spec.clone(),
                endpoint: ServiceEndpoint::default(),
            },
        );
        done(Ok(id))
    }

    fn inspect_service<'a>(&'a self, id: &'a str) -> EngineFuture<'a, Service> {
        let mut state = self.record(EngineCall::InspectService(id.to_string()));
        if !state.services.contains_key(id) {
            return done(Err(not_found("service", id)));
        }
        let polls = {
            let polls = state.inspections.entry(id.to_string()).or_insert(0);
            *polls += 1;
            *polls
        };
        let assign = !state.never_address && polls > state.address_after;
        let vips = if assign {
            state.pending_vips.get(id).cloned()
        } else {
            None
        };
        let Some(service) = state.services.get_mut(id) else {
            return done(Err(not_found("service", id)));
        };
        if let Some(vips) = vips {
            service.endpoint.virtual_ips = vips;
        }
        done(Ok(service.clone()))
    }

    fn update_service<'a>(
        &'a self,
        id: &'a str,
        version: u64,
        spec: &'a ServiceSpec,
    ) -> EngineFuture<'a, ()> {
        let mut state = self.record(EngineCall::UpdateService {
            id: id.to_string(),
            version,
            spec: spec.clone(),
        });
        let interleave = state.interleaved_writes > 0;
        if interleave {
            state.interleaved_writes -= 1;
        }
        let Some(service) = state.services.get_mut(id) else {
            return done(Err(not_found("service", id)));
        };
        if interleave {
            service.version.index += 1;
        }
        if version != service.version.index {
            return done(Err(EngineError::VersionConflict(format!(
                "update out of sequence: {id} is at {}, got {version}",
                service.version.index
            ))));
        }
        service.spec = spec.clone();
        service.version.index += 1;
        done(Ok(()))
    }

    fn remove_service<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()> {
        let mut state = self.record(EngineCall::RemoveService(id.to_string()));
        state.pending_vips.remove(id);
        done(match state.services.remove(id) {
            Some(_) => Ok(()),
            None => Err(not_found("service", id)),
        })
    }
}

/// Connector handing out shared mock engines keyed by venue ID.
#[derive(Default)]
pub struct MockConnector {
    engines: BTreeMap<String, Arc<MockEngine>>,
    fallback: Option<Arc<MockEngine>>,
    refused: BTreeSet<String>,
}

impl MockConnector {
    /// Every venue reaches `engine`.
    pub fn single(engine: Arc<MockEngine>) -> Self {
        Self {
            fallback: Some(engine),
            ..Default::default()
        }
    }

    pub fn with_venue(mut self, venue_id: &str, engine: Arc<MockEngine>) -> Self {
        self.engines.insert(venue_id.to_string(), engine);
        self
    }

    /// Connecting to `venue_id` fails.
    pub fn refuse(mut self, venue_id: &str) -> Self {
        self.refused.insert(venue_id.to_string());
        self
    }
}

impl EngineConnector for MockConnector {
    fn connect(&self, venue: &VimInstance) -> EngineResult<Arc<dyn Engine>> {
        if self.refused.contains(&venue.id) {
            return Err(EngineError::Transport(format!(
                "venue {} unreachable",
                venue.id
            )));
        }
        let engine = self
            .engines
            .get(&venue.id)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| EngineError::InvalidEndpoint(venue.auth_url.clone()))?;
        Ok(engine as Arc<dyn Engine>)
    }
}
