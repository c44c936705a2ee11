//! The engine capability consumed by the lifecycle driver.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::EngineResult;
use crate::model::*;

/// Boxed future returned by every engine call.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = EngineResult<T>> + Send + 'a>>;

/// Container output, one decoded line per message. The channel closes at
/// end of stream or on the first read error.
pub type LogStream = mpsc::Receiver<String>;

/// Operations the driver needs from one container engine.
///
/// Implementations are cheap handles; the driver clones the surrounding
/// `Arc` into detached tasks (log followers, fire-and-forget removal).
pub trait Engine: Send + Sync {
    // Networks
    fn list_networks(&self) -> EngineFuture<'_, Vec<Network>>;

    fn inspect_network<'a>(&'a self, id: &'a str) -> EngineFuture<'a, Network>;

    /// Attach a running container to an additional network.
    fn connect_network<'a>(
        &'a self,
        network_id: &'a str,
        container_id: &'a str,
        endpoint: &'a EndpointSettings,
    ) -> EngineFuture<'a, ()>;

    // Images
    fn list_images(&self) -> EngineFuture<'_, Vec<ImageSummary>>;

    // Containers
    fn create_container<'a>(
        &'a self,
        name: &'a str,
        config: &'a ContainerConfig,
    ) -> EngineFuture<'a, Created>;

    fn start_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()>;

    /// Stop, killing the container once `grace` elapses.
    fn stop_container<'a>(&'a self, id: &'a str, grace: Duration) -> EngineFuture<'a, ()>;

    /// Force-remove a container.
    fn remove_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()>;

    fn inspect_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ContainerDetails>;

    fn container_logs<'a>(&'a self, id: &'a str) -> EngineFuture<'a, LogStream>;

    // Services
    /// Create a service; returns its identifier.
    fn create_service<'a>(&'a self, spec: &'a ServiceSpec) -> EngineFuture<'a, String>;

    fn inspect_service<'a>(&'a self, id: &'a str) -> EngineFuture<'a, Service>;

    /// Replace a service's spec. `version` must be the index last observed;
    /// a stale index fails with `VersionConflict`.
    fn update_service<'a>(
        &'a self,
        id: &'a str,
        version: u64,
        spec: &'a ServiceSpec,
    ) -> EngineFuture<'a, ()>;

    fn remove_service<'a>(&'a self, id: &'a str) -> EngineFuture<'a, ()>;
}
