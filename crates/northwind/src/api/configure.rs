//! Ordered service configuration. Each step takes the services built so far
//! and returns them with one more concern wired in.

use std::sync::{Arc, OnceLock};

use tracing::info;

use super::domain::{Customer, Employee, Entity, Order, OrderDetail, Product, Region, Supplier};
use super::operations;
use super::permissions::PermissionTable;
use super::service::NorthwindApi;
use super::store::EntityStore;
use super::submit::SubmitHook;
use super::views::View;
use crate::config::ApiConfig;
use crate::model::{
    EdmModel, EmptyModelBuilder, EntitySetRegistration, ModelBuilder, ModelContext, ModelError,
    NorthwindModelExtender, PublisherModelBuilder, StoreModelBuilder,
};

pub type ConfigureStep = fn(ApiServices) -> ApiServices;

/// Steps the Northwind API runs, in order.
pub const NORTHWIND_STEPS: [ConfigureStep; 5] = [
    add_core_services,
    add_permission_services,
    add_store_services,
    add_model_extender,
    add_publisher_services,
];

/// Services assembled before the API is exposed.
pub struct ApiServices {
    pub config: ApiConfig,
    pub permissions: PermissionTable,
    model_builder: Option<Box<dyn ModelBuilder>>,
    model: OnceLock<Arc<EdmModel>>,
}

impl ApiServices {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            permissions: PermissionTable::new(),
            model_builder: None,
            model: OnceLock::new(),
        }
    }

    /// Runs `steps` in order over fresh services.
    pub fn configure(config: ApiConfig, steps: &[ConfigureStep]) -> Self {
        steps
            .iter()
            .fold(Self::new(config), |services, step| step(services))
    }

    pub fn northwind(config: ApiConfig) -> Self {
        Self::configure(config, &NORTHWIND_STEPS)
    }

    /// Wraps the current model-builder chain in a new outer stage.
    pub fn wrap_model_builder<F>(mut self, wrap: F) -> Self
    where
        F: FnOnce(Box<dyn ModelBuilder>) -> Box<dyn ModelBuilder>,
    {
        let inner = self
            .model_builder
            .take()
            .unwrap_or_else(|| Box::new(EmptyModelBuilder));
        self.model_builder = Some(wrap(inner));
        self
    }

    /// Runs the chain on first use and caches the result. A chain that
    /// yields no model is a startup failure.
    pub fn build_model(&self) -> Result<Arc<EdmModel>, ModelError> {
        if let Some(model) = self.model.get() {
            return Ok(model.clone());
        }

        let builder = self.model_builder.as_ref().ok_or(ModelError::NoModel)?;
        let mut context = ModelContext::new(self.config.namespace.clone());
        let model = builder.get_model(&mut context)?.ok_or(ModelError::NoModel)?;
        info!(
            namespace = %model.namespace,
            entity_sets = model.entity_sets.len(),
            operations = model.operations.len(),
            "entity data model built"
        );

        let model = Arc::new(model);
        Ok(self.model.get_or_init(|| model).clone())
    }

    /// Builds the model and hands everything to the request facade.
    pub fn into_api<S, H>(
        self,
        store: Arc<S>,
        hooks: Arc<H>,
    ) -> Result<NorthwindApi<S, H>, ModelError>
    where
        S: EntityStore + 'static,
        H: SubmitHook + 'static,
    {
        let model = self.build_model()?;
        Ok(NorthwindApi::new(
            store,
            hooks,
            Arc::new(self.permissions),
            model,
            self.config,
        ))
    }
}

/// Entity sets backed by the store, with their registrations.
pub fn northwind_entity_sets() -> Vec<(&'static str, EntitySetRegistration)> {
    vec![
        (Customer::ENTITY_SET, EntitySetRegistration::of::<Customer>()),
        (Product::ENTITY_SET, EntitySetRegistration::of::<Product>()),
        (Order::ENTITY_SET, EntitySetRegistration::of::<Order>()),
        (OrderDetail::ENTITY_SET, EntitySetRegistration::of::<OrderDetail>()),
        (Supplier::ENTITY_SET, EntitySetRegistration::of::<Supplier>()),
        (Employee::ENTITY_SET, EntitySetRegistration::of::<Employee>()),
        (Region::ENTITY_SET, EntitySetRegistration::of::<Region>()),
    ]
}

pub fn add_core_services(services: ApiServices) -> ApiServices {
    services.wrap_model_builder(|inner| inner)
}

pub fn add_permission_services(mut services: ApiServices) -> ApiServices {
    services.permissions = PermissionTable::northwind();
    services
}

pub fn add_store_services(services: ApiServices) -> ApiServices {
    services.wrap_model_builder(|inner| {
        Box::new(StoreModelBuilder::new(inner, northwind_entity_sets()))
    })
}

pub fn add_model_extender(services: ApiServices) -> ApiServices {
    services.wrap_model_builder(|inner| Box::new(NorthwindModelExtender::new(inner)))
}

pub fn add_publisher_services(services: ApiServices) -> ApiServices {
    services.wrap_model_builder(|inner| {
        let views = View::ALL.iter().map(|view| view.entity_set()).collect();
        Box::new(PublisherModelBuilder::new(inner, views, operations::descriptors()))
    })
}
