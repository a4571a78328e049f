use metrics_exporter_prometheus::PrometheusHandle;
use northwind::api::seed;
use northwind::api::{
    ApiServices, InMemoryStore, NorthwindApi, ProductChangeLogger, TracingChangeLog,
};
use northwind::config::ApiConfig;
use northwind::error::AppError;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub(crate) type ServiceApi = NorthwindApi<InMemoryStore, ProductChangeLogger<TracingChangeLog>>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seeds the in-memory store, runs the configuration steps and builds the
/// model. Any failure here aborts startup.
pub(crate) fn build_api(config: &ApiConfig) -> Result<Arc<ServiceApi>, AppError> {
    let tables = seed::northwind()?;
    let store = Arc::new(InMemoryStore::new(tables));
    let hooks = Arc::new(ProductChangeLogger::new(Arc::new(TracingChangeLog)));

    let api = ApiServices::northwind(config.clone()).into_api(store, hooks)?;
    info!(
        namespace = %api.model().namespace,
        entity_sets = api.model().entity_sets.len(),
        "northwind api assembled"
    );
    Ok(Arc::new(api))
}
