//! The backend-driver interface and its two strategies.
//!
//! A record is realized either as one container per component instance
//! or as one replicated service per deployment unit. The strategy is
//! chosen at instantiation and stored in the record; the lifecycle
//! controller only ever talks to [`BackendDriver`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{info, warn};
use vnfm_catalogue::{Ip, VirtualDeploymentUnit, VnfComponent, VnfcInstance, VnfdConnectionPoint};
use vnfm_engine::Engine;
use vnfm_state::{BackendKind, InstanceConfig, ServicePhase, ServiceState, UnitBinding};

use crate::container::ContainerDriver;
use crate::error::{DriverError, DriverResult};
use crate::followers::LogFollowers;
use crate::network::{self, NetworkPlan};
use crate::service::{ServiceDriver, ServiceUpdate};
use crate::settings::DriverSettings;

/// Boxed future returned by backend operations.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = DriverResult<T>> + Send + 'a>>;

/// One deployment unit of a record, with the engine of its bound venue.
pub struct UnitContext<'a> {
    pub engine: Arc<dyn Engine>,
    pub config: &'a mut InstanceConfig,
    pub vdu: &'a mut VirtualDeploymentUnit,
}

impl UnitContext<'_> {
    fn binding(&self) -> DriverResult<&UnitBinding> {
        self.config
            .unit(&self.vdu.id)
            .ok_or_else(|| DriverError::UnknownDeploymentUnit(self.vdu.id.clone()))
    }

    fn binding_mut(&mut self) -> DriverResult<&mut UnitBinding> {
        self.config
            .unit_mut(&self.vdu.id)
            .ok_or_else(|| DriverError::UnknownDeploymentUnit(self.vdu.id.clone()))
    }
}

/// Operations the lifecycle controller needs from a backend strategy.
///
/// Every operation records the backend identifiers it creates in the
/// unit's binding as soon as they exist, so a failure part-way leaves the
/// record pointing at everything that was created.
pub trait BackendDriver: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Prepare a freshly bound unit and fill in its component instances.
    fn provision<'a>(&'a self, unit: UnitContext<'a>, plan: &'a NetworkPlan)
    -> DriverFuture<'a, ()>;

    /// Bring the unit's component instances up.
    fn start_unit<'a>(&'a self, unit: UnitContext<'a>) -> DriverFuture<'a, ()>;

    /// Add one replica built from `component`.
    fn add_instance<'a>(
        &'a self,
        unit: UnitContext<'a>,
        component: &'a VnfComponent,
    ) -> DriverFuture<'a, VnfcInstance>;

    /// Remove one running replica.
    fn remove_instance<'a>(
        &'a self,
        unit: UnitContext<'a>,
        instance: &'a VnfcInstance,
    ) -> DriverFuture<'a, ()>;

    /// Release one backend object during terminate.
    fn teardown<'a>(&'a self, engine: Arc<dyn Engine>, backend_id: &'a str)
    -> DriverFuture<'a, ()>;
}

fn new_instance(
    venue_id: &str,
    hostname: &str,
    component: &VnfComponent,
    connection_points: Vec<VnfdConnectionPoint>,
    ips: Vec<Ip>,
) -> VnfcInstance {
    VnfcInstance {
        vim_id: venue_id.to_string(),
        hostname: hostname.to_string(),
        state: "ACTIVE".to_string(),
        connection_points,
        vnf_component: component.clone(),
        ips,
        ..Default::default()
    }
}

// ── Containers ─────────────────────────────────────────────────────

/// One container per component instance, created at start.
pub struct ContainerBackend {
    settings: DriverSettings,
    followers: LogFollowers,
}

impl ContainerBackend {
    pub fn new(settings: DriverSettings) -> Self {
        let followers = LogFollowers::new(settings.log_delay());
        Self {
            settings,
            followers,
        }
    }

    pub fn followers(&self) -> &LogFollowers {
        &self.followers
    }

    fn driver(&self, engine: Arc<dyn Engine>) -> ContainerDriver {
        ContainerDriver::new(engine, self.settings.clone(), self.followers.clone())
    }
}

impl BackendDriver for ContainerBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    fn provision<'a>(
        &'a self,
        mut unit: UnitContext<'a>,
        plan: &'a NetworkPlan,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let venue_id = unit.binding()?.venue.id.clone();
            let hostname = unit.config.base_hostname.clone();
            unit.vdu.vnfc_instances = unit
                .vdu
                .vnfcs
                .iter()
                .map(|component| {
                    new_instance(
                        &venue_id,
                        &hostname,
                        component,
                        plan.connection_points.clone(),
                        plan.ips.clone(),
                    )
                })
                .collect();
            Ok(())
        })
    }

    fn start_unit<'a>(&'a self, mut unit: UnitContext<'a>) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let image = unit.binding()?.image.clone();
            let engine = unit.engine.clone();
            let driver = self.driver(engine.clone());
            let config = &mut *unit.config;

            for instance in unit.vdu.vnfc_instances.iter_mut() {
                let plan =
                    network::for_launch(engine.as_ref(), config, &instance.connection_points)
                        .await?;
                let launched = driver.launch(config, &image, &plan).await?;
                if let Some(binding) = config.unit_mut(&unit.vdu.id) {
                    binding.backend_ids.push(launched.id.clone());
                }
                instance.vc_id = launched.id;
                instance.hostname = launched.name;
                instance.ips = launched
                    .addresses
                    .iter()
                    .map(|(net, ip)| Ip::new(net, ip))
                    .collect();
            }
            Ok(())
        })
    }

    fn add_instance<'a>(
        &'a self,
        mut unit: UnitContext<'a>,
        component: &'a VnfComponent,
    ) -> DriverFuture<'a, VnfcInstance> {
        Box::pin(async move {
            let resolved =
                network::resolve_points(unit.engine.as_ref(), &component.connection_points)
                    .await?;
            resolved.merge_into(unit.config);

            let (venue_id, image) = {
                let binding = unit.binding()?;
                (binding.venue.id.clone(), binding.image.clone())
            };
            let mut instance = new_instance(
                &venue_id,
                &unit.config.base_hostname,
                component,
                resolved.connection_points,
                resolved.ips,
            );

            let plan =
                network::for_launch(unit.engine.as_ref(), unit.config, &instance.connection_points)
                    .await?;
            let launched = self
                .driver(unit.engine.clone())
                .launch(unit.config, &image, &plan)
                .await?;
            unit.binding_mut()?.backend_ids.push(launched.id.clone());

            instance.vc_id = launched.id;
            instance.hostname = launched.name;
            instance.ips = launched
                .addresses
                .iter()
                .map(|(net, ip)| Ip::new(net, ip))
                .collect();
            Ok(instance)
        })
    }

    fn remove_instance<'a>(
        &'a self,
        mut unit: UnitContext<'a>,
        instance: &'a VnfcInstance,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            if instance.vc_id.is_empty() {
                warn!(vnfr_id = %unit.config.vnfr_id, instance = %instance.id, "instance has no container");
                return Ok(());
            }
            self.driver(unit.engine.clone())
                .stop_and_remove(&instance.vc_id)
                .await;
            unit.binding_mut()?.forget(&instance.vc_id);
            info!(vnfr_id = %unit.config.vnfr_id, container_id = %instance.vc_id, "instance removed");
            Ok(())
        })
    }

    fn teardown<'a>(
        &'a self,
        engine: Arc<dyn Engine>,
        backend_id: &'a str,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            self.driver(engine).stop_and_remove(backend_id).await;
            Ok(())
        })
    }
}

// ── Services ───────────────────────────────────────────────────────

/// One replicated service per deployment unit, created at instantiation
/// with zero replicas and scaled at start.
pub struct ServiceBackend {
    settings: DriverSettings,
}

impl ServiceBackend {
    pub fn new(settings: DriverSettings) -> Self {
        Self { settings }
    }

    fn driver(&self, engine: Arc<dyn Engine>) -> ServiceDriver {
        ServiceDriver::new(engine, self.settings.clone())
    }

    /// Submit `replicas` for the unit's service and advance its phase.
    async fn scale_to(&self, unit: &mut UnitContext<'_>, replicas: u64) -> DriverResult<Vec<Ip>> {
        let service_id = unit
            .binding()?
            .service_id()
            .map(str::to_string)
            .ok_or_else(|| DriverError::NotProvisioned(unit.vdu.id.clone()))?;

        let driver = self.driver(unit.engine.clone());
        let update = ServiceUpdate::for_config(unit.config, replicas);
        let service = driver.update(&service_id, &update).await?;

        if let Some(state) = unit.binding_mut()?.service.as_mut() {
            advance(state, ServicePhase::Scaled);
            state.replicas = replicas;
        }
        driver.addresses(&service).await
    }
}

fn advance(state: &mut ServiceState, next: ServicePhase) {
    if !state.phase.can_advance_to(next) {
        warn!(from = ?state.phase, to = ?next, "unexpected service phase transition");
    }
    state.phase = next;
}

impl BackendDriver for ServiceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Service
    }

    fn provision<'a>(
        &'a self,
        mut unit: UnitContext<'a>,
        plan: &'a NetworkPlan,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let (venue_id, image) = {
                let binding = unit.binding()?;
                (binding.venue.id.clone(), binding.image.clone())
            };
            let driver = self.driver(unit.engine.clone());

            let service_id = driver.create(unit.config, &image, plan, 0).await?;
            {
                let binding = unit.binding_mut()?;
                binding.backend_ids.push(service_id.clone());
                binding.service = Some(ServiceState {
                    replicas: 0,
                    phase: ServicePhase::Created,
                });
            }

            let service = driver.wait_for_address(&service_id).await?;
            if let Some(state) = unit.binding_mut()?.service.as_mut() {
                advance(state, ServicePhase::Addressed);
            }

            let ips = driver.addresses(&service).await?;
            for ip in &ips {
                unit.config
                    .settings
                    .own
                    .insert(ip.net_name.to_uppercase(), ip.ip.clone());
            }

            let hostname = unit.config.base_hostname.clone();
            unit.vdu.vnfc_instances = unit
                .vdu
                .vnfcs
                .iter()
                .map(|component| {
                    let mut instance = new_instance(
                        &venue_id,
                        &hostname,
                        component,
                        plan.connection_points.clone(),
                        ips.clone(),
                    );
                    instance.vc_id = service_id.clone();
                    instance
                })
                .collect();
            Ok(())
        })
    }

    fn start_unit<'a>(&'a self, mut unit: UnitContext<'a>) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            // A unit already scaled keeps its replica count.
            let replicas = match unit.binding()?.service {
                Some(state) if state.replicas > 0 => state.replicas,
                _ => unit.vdu.vnfc_instances.len().max(unit.vdu.vnfcs.len()) as u64,
            };
            let ips = self.scale_to(&mut unit, replicas).await?;
            for instance in unit.vdu.vnfc_instances.iter_mut() {
                instance.ips = ips.clone();
            }
            Ok(())
        })
    }

    fn add_instance<'a>(
        &'a self,
        mut unit: UnitContext<'a>,
        component: &'a VnfComponent,
    ) -> DriverFuture<'a, VnfcInstance> {
        Box::pin(async move {
            let (venue_id, service_id, replicas) = {
                let binding = unit.binding()?;
                let service_id = binding
                    .service_id()
                    .ok_or_else(|| DriverError::NotProvisioned(unit.vdu.id.clone()))?;
                let replicas = binding.service.map_or(0, |s| s.replicas);
                (binding.venue.id.clone(), service_id.to_string(), replicas)
            };

            let resolved =
                network::resolve_points(unit.engine.as_ref(), &component.connection_points)
                    .await?;
            let ips = self.scale_to(&mut unit, replicas + 1).await?;

            let mut instance = new_instance(
                &venue_id,
                &unit.config.base_hostname,
                component,
                resolved.connection_points,
                ips,
            );
            instance.vc_id = service_id;
            Ok(instance)
        })
    }

    fn remove_instance<'a>(
        &'a self,
        mut unit: UnitContext<'a>,
        instance: &'a VnfcInstance,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let replicas = unit
                .binding()?
                .service
                .map_or(0, |s| s.replicas)
                .saturating_sub(1);
            self.scale_to(&mut unit, replicas).await?;
            info!(vnfr_id = %unit.config.vnfr_id, instance = %instance.id, replicas, "replica removed");
            Ok(())
        })
    }

    fn teardown<'a>(
        &'a self,
        engine: Arc<dyn Engine>,
        backend_id: &'a str,
    ) -> DriverFuture<'a, ()> {
        Box::pin(async move { self.driver(engine).remove(backend_id).await })
    }
}
