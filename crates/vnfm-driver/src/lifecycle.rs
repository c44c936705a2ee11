//! Lifecycle controller: drives a VNF record through its backend.
//!
//! Every mutating operation takes the record's lock, loads the persisted
//! [`InstanceConfig`], lets the record's [`BackendDriver`] act on each
//! deployment unit and saves the result. Backend objects are recorded in
//! the config as soon as they exist; a failure part-way persists what was
//! created, so terminate can still release it, and returns the error.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, error, info, warn};
use vnfm_catalogue::{
    ScaleDirection, ScaleTarget, VenuePool, VimInstance, VirtualDeploymentUnit,
    VirtualNetworkFunctionRecord, VnfRecordDependency,
};
use vnfm_engine::{Engine, EngineConnector};
use vnfm_state::{BackendKind, InstanceConfig, RecordStore, StateError, UnitBinding};

use crate::backend::{BackendDriver, ContainerBackend, ServiceBackend, UnitContext};
use crate::env::merge_dependency;
use crate::error::{DriverError, DriverResult};
use crate::extract::extract;
use crate::followers::LogFollowers;
use crate::locks::RecordLocks;
use crate::network;
use crate::settings::DriverSettings;

/// Owns the record store and the backend strategies.
pub struct LifecycleController {
    store: RecordStore,
    connector: Arc<dyn EngineConnector>,
    /// Strategy for records instantiated from now on.
    backend: BackendKind,
    containers: ContainerBackend,
    services: ServiceBackend,
    locks: RecordLocks,
}

impl LifecycleController {
    pub fn new(
        store: RecordStore,
        connector: Arc<dyn EngineConnector>,
        backend: BackendKind,
        settings: DriverSettings,
    ) -> Self {
        Self {
            store,
            connector,
            backend,
            containers: ContainerBackend::new(settings.clone()),
            services: ServiceBackend::new(settings),
            locks: RecordLocks::new(),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn followers(&self) -> &LogFollowers {
        self.containers.followers()
    }

    /// The persisted config of `vnfr_id`, if any.
    pub fn record(&self, vnfr_id: &str) -> DriverResult<Option<InstanceConfig>> {
        Ok(self.store.get(vnfr_id)?)
    }

    /// Stop background work before the process exits.
    pub async fn shutdown(&self) {
        self.followers().cancel_all().await;
    }

    fn driver_for(&self, kind: BackendKind) -> &dyn BackendDriver {
        match kind {
            BackendKind::Container => &self.containers,
            BackendKind::Service => &self.services,
        }
    }

    // ── Operations ─────────────────────────────────────────────────

    /// Bind every deployment unit to a venue and image, provision its
    /// backend and persist the new config.
    pub async fn instantiate(
        &self,
        mut vnfr: VirtualNetworkFunctionRecord,
        pool: &VenuePool,
    ) -> DriverResult<VirtualNetworkFunctionRecord> {
        if vnfr.vdus.is_empty() {
            return Err(DriverError::NoDeploymentUnits(vnfr.id.clone()));
        }
        let _guard = self.locks.acquire(&vnfr.id).await;

        if self.store.is_retired(&vnfr.id)? {
            return Err(StateError::Retired(vnfr.id.clone()).into());
        }
        if self.store.get(&vnfr.id)?.is_some() {
            return Err(StateError::AlreadyExists(vnfr.id.clone()).into());
        }

        let extracted = extract(&vnfr.configurations.configuration_parameters);
        let mut config = InstanceConfig::new(&vnfr.id, &vnfr.name, self.backend);
        if let Some(hostname) = &extracted.settings.hostname {
            config.base_hostname = hostname.clone();
        }
        config.settings = extracted.settings;
        config.aliases = extracted.aliases;

        let driver = self.driver_for(self.backend);
        if let Err(e) = self
            .provision_units(&mut config, &mut vnfr.vdus, pool, driver)
            .await
        {
            self.keep_partial(&config, &e);
            return Err(e);
        }
        self.store.create(&config)?;

        info!(
            vnfr_id = %vnfr.id,
            name = %vnfr.name,
            backend = self.backend.as_str(),
            units = vnfr.vdus.len(),
            "record instantiated"
        );
        Ok(vnfr)
    }

    async fn provision_units(
        &self,
        config: &mut InstanceConfig,
        vdus: &mut [VirtualDeploymentUnit],
        pool: &VenuePool,
        driver: &dyn BackendDriver,
    ) -> DriverResult<()> {
        for vdu in vdus.iter_mut() {
            let venue = pick_venue(pool, vdu)?;
            let engine = self.connect(&venue)?;
            let image = choose_image(engine.as_ref(), &venue, vdu).await?;

            let points = vdu
                .vnfcs
                .first()
                .map(|c| c.connection_points.as_slice())
                .unwrap_or_default();
            let plan = network::resolve_points(engine.as_ref(), points).await?;
            plan.merge_into(config);

            debug!(vnfr_id = %config.vnfr_id, unit = %vdu.id, venue = %venue.id, %image, "unit bound");
            config.bind_unit(&vdu.id, UnitBinding::new(venue, &image));

            driver
                .provision(
                    UnitContext {
                        engine,
                        config: &mut *config,
                        vdu,
                    },
                    &plan,
                )
                .await?;
        }
        Ok(())
    }

    /// Bring every component instance of the record up.
    pub async fn start(
        &self,
        mut vnfr: VirtualNetworkFunctionRecord,
    ) -> DriverResult<VirtualNetworkFunctionRecord> {
        let _guard = self.locks.acquire(&vnfr.id).await;
        let mut config = self.load(&vnfr.id)?;
        let driver = self.driver_for(config.backend);

        for vdu in vnfr.vdus.iter_mut() {
            let started = match self.unit_engine(&config, &vdu.id) {
                Ok(engine) => {
                    driver
                        .start_unit(UnitContext {
                            engine,
                            config: &mut config,
                            vdu,
                        })
                        .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = started {
                error!(vnfr_id = %config.vnfr_id, error = %e, "start failed, keeping partial state");
                self.store.save(&config)?;
                return Err(e);
            }
        }

        self.store.save(&config)?;
        info!(vnfr_id = %vnfr.id, backend = config.backend.as_str(), "record started");
        Ok(vnfr)
    }

    /// Record a dependency update. The backend is not touched.
    pub async fn modify(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        dependency: &VnfRecordDependency,
    ) -> DriverResult<VirtualNetworkFunctionRecord> {
        let _guard = self.locks.acquire(&vnfr.id).await;
        let mut config = self.load(&vnfr.id)?;
        let appended = merge_dependency(&mut config, dependency);
        self.store.save(&config)?;
        info!(vnfr_id = %vnfr.id, appended, "dependency recorded");
        Ok(vnfr)
    }

    /// Add or remove one replica.
    pub async fn scale(
        &self,
        direction: ScaleDirection,
        mut vnfr: VirtualNetworkFunctionRecord,
        target: ScaleTarget,
        dependency: Option<&VnfRecordDependency>,
    ) -> DriverResult<VirtualNetworkFunctionRecord> {
        match (direction, &target) {
            (ScaleDirection::Out, ScaleTarget::NewComponent(_))
            | (ScaleDirection::In, ScaleTarget::ExistingInstance(_)) => {}
            (direction, target) => {
                return Err(DriverError::InvalidScaleTarget(format!(
                    "scale {direction:?} cannot take a {}",
                    target.label()
                )));
            }
        }

        let unit_index = match &target {
            ScaleTarget::NewComponent(component) => Some(
                vnfr.vdus
                    .iter()
                    .position(|v| v.declares_component(&component.id))
                    .ok_or_else(|| {
                        DriverError::InvalidScaleTarget(format!(
                            "no deployment unit declares component {}",
                            component.id
                        ))
                    })?,
            ),
            ScaleTarget::ExistingInstance(_) => None,
        };

        let _guard = self.locks.acquire(&vnfr.id).await;
        let mut config = self.load(&vnfr.id)?;
        if let Some(dependency) = dependency {
            merge_dependency(&mut config, dependency);
        }
        let driver = self.driver_for(config.backend);

        let scaled = match target {
            ScaleTarget::NewComponent(component) => {
                let vdu = unit_index
                    .and_then(|index| vnfr.vdus.get_mut(index))
                    .ok_or_else(|| DriverError::UnknownDeploymentUnit(component.id.clone()))?;
                let engine = self.unit_engine(&config, &vdu.id)?;
                let added = driver
                    .add_instance(
                        UnitContext {
                            engine,
                            config: &mut config,
                            vdu: &mut *vdu,
                        },
                        &component,
                    )
                    .await;
                added.map(|instance| {
                    info!(vnfr_id = %config.vnfr_id, unit = %vdu.id, vc_id = %instance.vc_id, "scaled out");
                    vdu.vnfc_instances.push(instance);
                })
            }
            ScaleTarget::ExistingInstance(instance) => {
                let found = vnfr.vdus.iter_mut().find_map(|vdu| {
                    let position = vdu
                        .vnfc_instances
                        .iter()
                        .position(|i| i.same_replica(&instance))?;
                    Some((vdu, position))
                });
                let Some((vdu, position)) = found else {
                    warn!(vnfr_id = %config.vnfr_id, instance = %instance.id, "scale-in target not found");
                    self.store.save(&config)?;
                    return Ok(vnfr);
                };
                let removed = vdu.vnfc_instances.remove(position);
                let engine = self.unit_engine(&config, &vdu.id)?;
                driver
                    .remove_instance(
                        UnitContext {
                            engine,
                            config: &mut config,
                            vdu,
                        },
                        &removed,
                    )
                    .await
            }
        };

        if let Err(e) = scaled {
            error!(vnfr_id = %config.vnfr_id, error = %e, "scale failed, keeping partial state");
            self.store.save(&config)?;
            return Err(e);
        }
        self.store.save(&config)?;
        Ok(vnfr)
    }

    /// Release every backend object and delete the record.
    ///
    /// Teardown is best effort; the record is deleted regardless. An
    /// unknown record is not an error.
    pub async fn terminate(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
    ) -> DriverResult<VirtualNetworkFunctionRecord> {
        let guard = self.locks.acquire(&vnfr.id).await;
        let Some(config) = self.store.get(&vnfr.id)? else {
            debug!(vnfr_id = %vnfr.id, "terminate: no record, nothing to do");
            drop(guard);
            self.locks.forget(&vnfr.id).await;
            return Ok(vnfr);
        };

        let driver = self.driver_for(config.backend);
        for (unit_id, binding) in &config.units {
            let engine = match self.connect(&binding.venue) {
                Ok(engine) => engine,
                Err(e) => {
                    error!(
                        vnfr_id = %config.vnfr_id,
                        unit = %unit_id,
                        backend_ids = ?binding.backend_ids,
                        error = %e,
                        "venue unreachable, leaving backend objects behind"
                    );
                    continue;
                }
            };
            for backend_id in &binding.backend_ids {
                if let Err(e) = driver.teardown(engine.clone(), backend_id).await {
                    error!(vnfr_id = %config.vnfr_id, unit = %unit_id, %backend_id, error = %e, "teardown failed");
                }
            }
        }

        self.store.delete(&vnfr.id)?;
        drop(guard);
        self.locks.forget(&vnfr.id).await;
        info!(vnfr_id = %vnfr.id, "record terminated");
        Ok(vnfr)
    }

    // ── Internal ───────────────────────────────────────────────────

    /// Persist a half-provisioned config so its backend objects stay
    /// reachable. A config that created nothing is dropped.
    fn keep_partial(&self, config: &InstanceConfig, cause: &DriverError) {
        if config.all_backend_ids().next().is_none() {
            return;
        }
        error!(
            vnfr_id = %config.vnfr_id,
            backend_ids = ?config.all_backend_ids().collect::<Vec<_>>(),
            error = %cause,
            "instantiate failed, keeping partial state"
        );
        if let Err(e) = self.store.create(config) {
            log_orphans(config, &DriverError::from(e));
        }
    }

    fn load(&self, vnfr_id: &str) -> DriverResult<InstanceConfig> {
        self.store
            .get(vnfr_id)?
            .ok_or_else(|| DriverError::RecordNotFound(vnfr_id.to_string()))
    }

    fn connect(&self, venue: &VimInstance) -> DriverResult<Arc<dyn Engine>> {
        self.connector
            .connect(venue)
            .map_err(|source| DriverError::Connect {
                venue: venue.id.clone(),
                source,
            })
    }

    /// Engine of the venue `unit_id` was bound to at instantiation.
    fn unit_engine(&self, config: &InstanceConfig, unit_id: &str) -> DriverResult<Arc<dyn Engine>> {
        let binding = config
            .unit(unit_id)
            .ok_or_else(|| DriverError::UnknownDeploymentUnit(unit_id.to_string()))?;
        self.connect(&binding.venue)
    }
}

fn log_orphans(config: &InstanceConfig, cause: &DriverError) {
    for (unit, backend_id) in config.all_backend_ids() {
        error!(
            vnfr_id = %config.vnfr_id,
            %unit,
            %backend_id,
            error = %cause,
            "instantiate failed, backend object left behind"
        );
    }
}

/// A random venue offered for the unit's parent.
fn pick_venue(pool: &VenuePool, vdu: &VirtualDeploymentUnit) -> DriverResult<VimInstance> {
    pool.get(&vdu.parent_vdu)
        .or_else(|| pool.get(&vdu.id))
        .and_then(|venues| venues.choose(&mut rand::thread_rng()))
        .cloned()
        .ok_or_else(|| DriverError::NoVenue(vdu.id.clone()))
}

/// The first requested image the venue has.
///
/// The venue's own catalogue is authoritative when it lists anything;
/// otherwise the engine is asked.
async fn choose_image(
    engine: &dyn Engine,
    venue: &VimInstance,
    vdu: &VirtualDeploymentUnit,
) -> DriverResult<String> {
    let chosen = if venue.images.is_empty() {
        let available = engine.list_images().await?;
        vdu.vm_images
            .iter()
            .find(|wanted| available.iter().any(|i| i.matches(wanted)))
    } else {
        vdu.vm_images
            .iter()
            .find(|wanted| venue.images.iter().any(|i| i.matches(wanted)))
    };
    chosen.cloned().ok_or_else(|| DriverError::ImageNotFound {
        unit: vdu.id.clone(),
        requested: vdu.vm_images.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use vnfm_catalogue::{
        ConfigurationParameter, DependencyParameters, VimImage, VnfComponent, VnfdConnectionPoint,
    };
    use vnfm_engine::mock::{EngineCall, MockConnector, MockEngine};
    use vnfm_state::ServicePhase;

    fn cp(link: &str, interface_id: u32) -> VnfdConnectionPoint {
        VnfdConnectionPoint {
            virtual_link_reference: link.into(),
            interface_id,
            ..Default::default()
        }
    }

    fn component(id: &str) -> VnfComponent {
        VnfComponent {
            id: id.into(),
            connection_points: vec![cp("mgmt", 0), cp("data", 1)],
        }
    }

    fn record(id: &str) -> VirtualNetworkFunctionRecord {
        let mut vnfr = VirtualNetworkFunctionRecord {
            id: id.into(),
            name: "web".into(),
            vdus: vec![VirtualDeploymentUnit {
                id: "vdu-1".into(),
                parent_vdu: "parent-1".into(),
                vm_images: vec!["nginx:latest".into()],
                vnfcs: vec![component("vnfc-1")],
                ..Default::default()
            }],
            ..Default::default()
        };
        vnfr.configurations
            .configuration_parameters
            .push(ConfigurationParameter::new("ROLE", "frontend"));
        vnfr
    }

    fn pool() -> VenuePool {
        let venue = VimInstance {
            id: "venue-1".into(),
            name: "local".into(),
            auth_url: "unix:///var/run/docker.sock".into(),
            ..Default::default()
        };
        VenuePool::from([("parent-1".to_string(), vec![venue])])
    }

    fn engine() -> MockEngine {
        MockEngine::new()
            .with_network("n-mgmt", "mgmt")
            .with_network("n-data", "data")
            .with_image("sha256:aa", &["nginx:latest"])
    }

    fn controller(engine: Arc<MockEngine>, backend: BackendKind) -> LifecycleController {
        let store = RecordStore::open_in_memory().unwrap();
        let settings = DriverSettings {
            service_poll_interval_ms: 1,
            service_poll_attempts: 5,
            ..Default::default()
        };
        LifecycleController::new(
            store,
            Arc::new(MockConnector::single(engine)),
            backend,
            settings,
        )
    }

    #[tokio::test]
    async fn instantiate_and_start_containers() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Container);

        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();
        assert_eq!(vnfr.vdus[0].vnfc_instances.len(), 1);
        assert!(engine.container_ids().is_empty());

        let vnfr = ctl.start(vnfr).await.unwrap();
        let container_id = vnfr.vdus[0].vnfc_instances[0].vc_id.clone();
        assert_eq!(container_id, "c1");

        let created = engine
            .calls()
            .into_iter()
            .find_map(|c| match c {
                EngineCall::CreateContainer { config, .. } => Some(config),
                _ => None,
            })
            .unwrap();
        let primary: Vec<_> = created.networking_config.endpoints_config.keys().collect();
        assert_eq!(primary, vec!["mgmt"]);
        assert!(created.env.contains(&"ROLE=frontend".to_string()));

        let connects: Vec<_> = engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::ConnectNetwork { network_id, .. } => Some(network_id),
                _ => None,
            })
            .collect();
        assert_eq!(connects, vec!["n-data".to_string()]);
        assert_eq!(engine.attached_networks(&container_id), vec!["data", "mgmt"]);

        let config = ctl.record("r1").unwrap().unwrap();
        assert!(config.networks.contains_key("n-mgmt"));
        assert!(config.networks.contains_key("n-data"));
        assert_eq!(config.unit("vdu-1").unwrap().backend_ids, vec!["c1"]);
        assert_eq!(config.unit("vdu-1").unwrap().image, "nginx:latest");

        let ips = &vnfr.vdus[0].vnfc_instances[0].ips;
        assert_eq!(ips.len(), 2);
        assert!(ips.iter().any(|ip| ip.net_name == "mgmt"));
    }

    #[tokio::test]
    async fn no_deployment_units_is_an_input_error() {
        let ctl = controller(Arc::new(engine()), BackendKind::Container);
        let mut vnfr = record("r1");
        vnfr.vdus.clear();

        let err = ctl.instantiate(vnfr, &pool()).await.unwrap_err();
        assert!(matches!(err, DriverError::NoDeploymentUnits(_)));
        assert_eq!(err.kind(), ErrorKind::Input);
        assert!(ctl.record("r1").unwrap().is_none());
    }

    #[tokio::test]
    async fn image_must_be_available() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Container);
        let mut vnfr = record("r1");
        vnfr.vdus[0].vm_images = vec!["redis:7".into()];

        let err = ctl.instantiate(vnfr, &pool()).await.unwrap_err();
        assert!(matches!(err, DriverError::ImageNotFound { .. }));
        assert_eq!(engine.count(|c| matches!(c, EngineCall::ListImages)), 1);
        assert!(ctl.record("r1").unwrap().is_none());
    }

    #[tokio::test]
    async fn venue_catalogue_is_used_when_present() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Container);
        let mut pool = pool();
        pool.get_mut("parent-1").unwrap()[0].images = vec![VimImage {
            id: "sha256:bb".into(),
            tags: vec!["web:2".into()],
        }];
        let mut vnfr = record("r1");
        vnfr.vdus[0].vm_images = vec!["web:1".into(), "web:2".into()];

        ctl.instantiate(vnfr, &pool).await.unwrap();
        assert_eq!(engine.count(|c| matches!(c, EngineCall::ListImages)), 0);
        let config = ctl.record("r1").unwrap().unwrap();
        assert_eq!(config.unit("vdu-1").unwrap().image, "web:2");
    }

    #[tokio::test]
    async fn missing_venue_is_rejected() {
        let ctl = controller(Arc::new(engine()), BackendKind::Container);
        let err = ctl
            .instantiate(record("r1"), &VenuePool::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::NoVenue(_)));
    }

    #[tokio::test]
    async fn unreachable_venue_is_a_resolution_error() {
        let engine = Arc::new(engine());
        let store = RecordStore::open_in_memory().unwrap();
        let ctl = LifecycleController::new(
            store,
            Arc::new(MockConnector::single(engine).refuse("venue-1")),
            BackendKind::Container,
            DriverSettings::default(),
        );
        let err = ctl.instantiate(record("r1"), &pool()).await.unwrap_err();
        assert!(matches!(err, DriverError::Connect { .. }));
        assert_eq!(err.kind(), ErrorKind::Resolution);
    }

    #[tokio::test]
    async fn duplicate_and_retired_ids_are_refused() {
        let ctl = controller(Arc::new(engine()), BackendKind::Container);
        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();

        let err = ctl.instantiate(record("r1"), &pool()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        ctl.terminate(vnfr).await.unwrap();
        let err = ctl.instantiate(record("r1"), &pool()).await.unwrap_err();
        assert!(matches!(err, DriverError::State(StateError::Retired(_))));
    }

    #[tokio::test]
    async fn terminate_twice_is_fine() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Container);
        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();
        let vnfr = ctl.start(vnfr).await.unwrap();

        let vnfr = ctl.terminate(vnfr).await.unwrap();
        assert!(ctl.record("r1").unwrap().is_none());
        assert_eq!(
            engine.count(|c| matches!(c, EngineCall::StopContainer(id) if id == "c1")),
            1
        );
        assert!(!ctl.followers().is_following("c1").await);

        ctl.terminate(vnfr).await.unwrap();
    }

    #[tokio::test]
    async fn start_requires_a_record() {
        let ctl = controller(Arc::new(engine()), BackendKind::Container);
        let err = ctl.start(record("ghost")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Missing);
    }

    #[tokio::test]
    async fn modify_appends_groups() {
        let ctl = controller(Arc::new(engine()), BackendKind::Container);
        let mut vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();

        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            let dependency = VnfRecordDependency {
                parameters: [(
                    "server".to_string(),
                    DependencyParameters::from_pairs(&[("ip", ip)]),
                )]
                .into(),
                ..Default::default()
            };
            vnfr = ctl.modify(vnfr, &dependency).await.unwrap();
        }

        let config = ctl.record("r1").unwrap().unwrap();
        let groups = &config.foreign["server"];
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0]["ip"], "10.0.0.1");
        assert_eq!(groups[2]["ip"], "10.0.0.3");
    }

    #[tokio::test]
    async fn scale_out_then_in_with_containers() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Container);
        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();
        let vnfr = ctl.start(vnfr).await.unwrap();

        let vnfr = ctl
            .scale(
                ScaleDirection::Out,
                vnfr,
                ScaleTarget::NewComponent(component("vnfc-1")),
                None,
            )
            .await
            .unwrap();
        assert_eq!(vnfr.vdus[0].vnfc_instances.len(), 2);
        let added = vnfr.vdus[0].vnfc_instances[1].clone();
        assert_eq!(added.vc_id, "c2");
        assert!(engine.is_running("c2"));

        let config = ctl.record("r1").unwrap().unwrap();
        assert_eq!(config.unit("vdu-1").unwrap().backend_ids, vec!["c1", "c2"]);

        let vnfr = ctl
            .scale(
                ScaleDirection::In,
                vnfr,
                ScaleTarget::ExistingInstance(added),
                None,
            )
            .await
            .unwrap();
        assert_eq!(vnfr.vdus[0].vnfc_instances.len(), 1);
        assert!(!engine.is_running("c2"));
        let config = ctl.record("r1").unwrap().unwrap();
        assert_eq!(config.unit("vdu-1").unwrap().backend_ids, vec!["c1"]);
    }

    #[tokio::test]
    async fn scale_direction_must_match_target() {
        let ctl = controller(Arc::new(engine()), BackendKind::Container);
        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();

        let err = ctl
            .scale(
                ScaleDirection::Out,
                vnfr,
                ScaleTarget::ExistingInstance(Default::default()),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidScaleTarget(_)));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[tokio::test]
    async fn service_backend_lifecycle() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Service);

        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();
        assert_eq!(engine.service_ids(), vec!["s1"]);
        assert_eq!(engine.service("s1").unwrap().spec.replicas(), 0);

        let config = ctl.record("r1").unwrap().unwrap();
        let binding = config.unit("vdu-1").unwrap();
        assert_eq!(binding.service_id(), Some("s1"));
        assert_eq!(binding.service.unwrap().phase, ServicePhase::Addressed);
        assert!(config.settings.own.contains_key("MGMT"));
        assert!(config.settings.own.contains_key("DATA"));
        assert_eq!(vnfr.vdus[0].vnfc_instances[0].ips.len(), 2);

        let vnfr = ctl.start(vnfr).await.unwrap();
        assert_eq!(engine.service("s1").unwrap().spec.replicas(), 1);
        let config = ctl.record("r1").unwrap().unwrap();
        let state = config.unit("vdu-1").unwrap().service.unwrap();
        assert_eq!(state.phase, ServicePhase::Scaled);
        assert_eq!(state.replicas, 1);

        let vnfr = ctl
            .scale(
                ScaleDirection::Out,
                vnfr,
                ScaleTarget::NewComponent(component("vnfc-1")),
                None,
            )
            .await
            .unwrap();
        assert_eq!(engine.service("s1").unwrap().spec.replicas(), 2);
        assert_eq!(vnfr.vdus[0].vnfc_instances.len(), 2);

        ctl.terminate(vnfr).await.unwrap();
        assert!(engine.service_ids().is_empty());
        assert!(ctl.record("r1").unwrap().is_none());
    }

    #[tokio::test]
    async fn restart_keeps_scaled_replicas() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Service);

        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();
        let vnfr = ctl.start(vnfr).await.unwrap();
        let vnfr = ctl
            .scale(
                ScaleDirection::Out,
                vnfr,
                ScaleTarget::NewComponent(component("vnfc-1")),
                None,
            )
            .await
            .unwrap();
        assert_eq!(engine.service("s1").unwrap().spec.replicas(), 2);

        ctl.start(vnfr).await.unwrap();
        assert_eq!(engine.service("s1").unwrap().spec.replicas(), 2);
        let config = ctl.record("r1").unwrap().unwrap();
        assert_eq!(config.unit("vdu-1").unwrap().service.unwrap().replicas, 2);
    }

    #[tokio::test]
    async fn scale_out_needs_a_declaring_unit() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Container);
        let vnfr = ctl.instantiate(record("r1"), &pool()).await.unwrap();
        let before = engine.calls().len();

        let err = ctl
            .scale(
                ScaleDirection::Out,
                vnfr,
                ScaleTarget::NewComponent(component("vnfc-9")),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidScaleTarget(_)));
        assert_eq!(err.kind(), ErrorKind::Input);
        assert_eq!(engine.calls().len(), before);
    }

    #[tokio::test]
    async fn failed_instantiate_keeps_created_objects_reachable() {
        let engine = Arc::new(engine().never_address());
        let ctl = controller(engine.clone(), BackendKind::Service);

        let err = ctl.instantiate(record("r1"), &pool()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(engine.service_ids(), vec!["s1"]);

        let config = ctl.record("r1").unwrap().unwrap();
        let binding = config.unit("vdu-1").unwrap();
        assert_eq!(binding.backend_ids, vec!["s1"]);
        assert_eq!(binding.service.unwrap().phase, ServicePhase::Created);

        ctl.terminate(record("r1")).await.unwrap();
        assert!(engine.service_ids().is_empty());
        assert!(ctl.record("r1").unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_instantiate_without_objects_leaves_no_record() {
        let engine = Arc::new(engine());
        let ctl = controller(engine.clone(), BackendKind::Service);
        let mut vnfr = record("r1");
        vnfr.vdus[0].vm_images = vec!["redis:7".into()];

        ctl.instantiate(vnfr, &pool()).await.unwrap_err();
        assert!(engine.service_ids().is_empty());
        assert!(ctl.record("r1").unwrap().is_none());
    }
}
