//! The lifecycle contract consumed by the orchestration framework.

use std::future::Future;
use std::pin::Pin;

use tracing::{debug, error};
use vnfm_catalogue::{
    ScaleDirection, ScaleTarget, VenuePool, VirtualNetworkFunctionRecord, VnfRecordDependency,
    VnfcInstance,
};

use crate::error::DriverResult;
use crate::lifecycle::LifecycleController;

/// Future returned by every lifecycle hook; resolves to the updated record.
pub type HandlerFuture<'a> =
    Pin<Box<dyn Future<Output = DriverResult<VirtualNetworkFunctionRecord>> + Send + 'a>>;

fn unchanged<'a>(hook: &'static str, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
    debug!(vnfr_id = %vnfr.id, hook, "no-op lifecycle hook");
    Box::pin(async move { Ok(vnfr) })
}

/// Lifecycle hooks of a VNF manager.
///
/// Five hooks carry behaviour. The rest exist to complete the contract
/// and hand the record back unchanged.
pub trait VnfmHandler: Send + Sync {
    fn instantiate<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
        pool: &'a VenuePool,
    ) -> HandlerFuture<'a>;

    fn start<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a>;

    fn modify<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
        dependency: &'a VnfRecordDependency,
    ) -> HandlerFuture<'a>;

    fn scale<'a>(
        &'a self,
        direction: ScaleDirection,
        vnfr: VirtualNetworkFunctionRecord,
        target: ScaleTarget,
        dependency: Option<&'a VnfRecordDependency>,
    ) -> HandlerFuture<'a>;

    fn terminate<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a>;

    fn heal<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
        _instance: &'a VnfcInstance,
        _cause: &'a str,
    ) -> HandlerFuture<'a> {
        unchanged("heal", vnfr)
    }

    fn resume<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        unchanged("resume", vnfr)
    }

    fn configure<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        unchanged("configure", vnfr)
    }

    fn check_instantiation_feasibility<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
    ) -> HandlerFuture<'a> {
        unchanged("check_instantiation_feasibility", vnfr)
    }

    /// Called by the framework after another hook failed.
    fn handle_error<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        error!(vnfr_id = %vnfr.id, name = %vnfr.name, "orchestrator reported an error for record");
        Box::pin(async move { Ok(vnfr) })
    }

    fn query<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        unchanged("query", vnfr)
    }

    fn start_vnfc_instance<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
        _instance: &'a VnfcInstance,
    ) -> HandlerFuture<'a> {
        unchanged("start_vnfc_instance", vnfr)
    }

    fn stop_vnfc_instance<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
        _instance: &'a VnfcInstance,
    ) -> HandlerFuture<'a> {
        unchanged("stop_vnfc_instance", vnfr)
    }

    fn stop<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        unchanged("stop", vnfr)
    }

    fn update_software<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        unchanged("update_software", vnfr)
    }

    fn upgrade_software<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        unchanged("upgrade_software", vnfr)
    }

    fn user_data(&self) -> String {
        String::new()
    }
}

impl VnfmHandler for LifecycleController {
    fn instantiate<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
        pool: &'a VenuePool,
    ) -> HandlerFuture<'a> {
        Box::pin(LifecycleController::instantiate(self, vnfr, pool))
    }

    fn start<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        Box::pin(LifecycleController::start(self, vnfr))
    }

    fn modify<'a>(
        &'a self,
        vnfr: VirtualNetworkFunctionRecord,
        dependency: &'a VnfRecordDependency,
    ) -> HandlerFuture<'a> {
        Box::pin(LifecycleController::modify(self, vnfr, dependency))
    }

    fn scale<'a>(
        &'a self,
        direction: ScaleDirection,
        vnfr: VirtualNetworkFunctionRecord,
        target: ScaleTarget,
        dependency: Option<&'a VnfRecordDependency>,
    ) -> HandlerFuture<'a> {
        Box::pin(LifecycleController::scale(
            self, direction, vnfr, target, dependency,
        ))
    }

    fn terminate<'a>(&'a self, vnfr: VirtualNetworkFunctionRecord) -> HandlerFuture<'a> {
        Box::pin(LifecycleController::terminate(self, vnfr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use vnfm_engine::mock::{MockConnector, MockEngine};
    use vnfm_state::{BackendKind, RecordStore};

    use crate::settings::DriverSettings;

    fn handler(engine: Arc<MockEngine>) -> Arc<dyn VnfmHandler> {
        Arc::new(LifecycleController::new(
            RecordStore::open_in_memory().unwrap(),
            Arc::new(MockConnector::single(engine)),
            BackendKind::Container,
            DriverSettings::default(),
        ))
    }

    fn record() -> VirtualNetworkFunctionRecord {
        VirtualNetworkFunctionRecord {
            id: "r1".into(),
            name: "web".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn no_op_hooks_return_the_record() {
        let engine = Arc::new(MockEngine::new());
        let handler = handler(engine.clone());
        let instance = VnfcInstance::default();

        assert_eq!(handler.resume(record()).await.unwrap(), record());
        assert_eq!(handler.configure(record()).await.unwrap(), record());
        assert_eq!(handler.heal(record(), &instance, "crash").await.unwrap(), record());
        assert_eq!(handler.handle_error(record()).await.unwrap(), record());
        assert_eq!(handler.stop_vnfc_instance(record(), &instance).await.unwrap(), record());
        assert_eq!(handler.upgrade_software(record()).await.unwrap(), record());
        assert!(handler.user_data().is_empty());
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn terminate_of_unknown_record_succeeds() {
        let handler = handler(Arc::new(MockEngine::new()));
        assert_eq!(handler.terminate(record()).await.unwrap(), record());
    }
}
