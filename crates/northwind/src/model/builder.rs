use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{EdmModel, EntitySet, ModelError, OperationDescriptor};
use crate::api::domain::Entity;

/// One stage of the model-building chain. Stages wrap an inner stage and may
/// return `None` when they leave model construction to an outer stage.
pub trait ModelBuilder: Send + Sync {
    fn get_model(&self, context: &mut ModelContext) -> Result<Option<EdmModel>, ModelError>;
}

/// Shared scratch state threaded through the chain for one build.
#[derive(Debug)]
pub struct ModelContext {
    pub namespace: String,
    /// Entity-set name to registration. Emptied once the sets are materialised.
    pub entity_set_type_map: BTreeMap<String, EntitySetRegistration>,
}

impl ModelContext {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entity_set_type_map: BTreeMap::new(),
        }
    }
}

/// Statically instantiated "register an entity set of type T" capability.
#[derive(Clone, Copy)]
pub struct EntitySetRegistration {
    pub type_name: &'static str,
    register: fn(&mut ConventionModelBuilder, &str),
}

impl EntitySetRegistration {
    pub fn of<T: Entity>() -> Self {
        Self {
            type_name: T::TYPE_NAME,
            register: register_entity_set::<T>,
        }
    }

    pub fn apply(&self, builder: &mut ConventionModelBuilder, entity_set: &str) {
        (self.register)(builder, entity_set);
    }
}

impl fmt::Debug for EntitySetRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySetRegistration")
            .field("type_name", &self.type_name)
            .finish()
    }
}

pub fn register_entity_set<T: Entity>(builder: &mut ConventionModelBuilder, entity_set: &str) {
    builder.entity_set::<T>(entity_set);
}

/// Builds a model from entity types registered by their Rust type.
#[derive(Debug)]
pub struct ConventionModelBuilder {
    model: EdmModel,
}

impl ConventionModelBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            model: EdmModel::new(namespace),
        }
    }

    pub fn entity_set<T: Entity>(&mut self, entity_set: &str) -> &mut Self {
        if self.model.entity_type(T::TYPE_NAME).is_none() {
            self.model.entity_types.push(T::entity_type());
        }
        self.model.add_entity_set(entity_set, T::TYPE_NAME);
        self
    }

    pub fn get_edm_model(self) -> EdmModel {
        self.model
    }
}

/// Innermost stage; produces nothing.
#[derive(Debug, Default)]
pub struct EmptyModelBuilder;

impl ModelBuilder for EmptyModelBuilder {
    fn get_model(&self, _context: &mut ModelContext) -> Result<Option<EdmModel>, ModelError> {
        Ok(None)
    }
}

/// Store-provider stage. It does not build a model; it only hands the
/// entity-set name to type map to the outer stages, and only on its first run.
pub struct StoreModelBuilder {
    inner: Box<dyn ModelBuilder>,
    entity_sets: Vec<(&'static str, EntitySetRegistration)>,
    published: AtomicBool,
}

impl StoreModelBuilder {
    pub fn new(
        inner: Box<dyn ModelBuilder>,
        entity_sets: Vec<(&'static str, EntitySetRegistration)>,
    ) -> Self {
        Self {
            inner,
            entity_sets,
            published: AtomicBool::new(false),
        }
    }
}

impl ModelBuilder for StoreModelBuilder {
    fn get_model(&self, context: &mut ModelContext) -> Result<Option<EdmModel>, ModelError> {
        let model = self.inner.get_model(context)?;
        if model.is_some() {
            return Ok(model);
        }

        if !self.published.swap(true, Ordering::AcqRel) {
            for (name, registration) in &self.entity_sets {
                context
                    .entity_set_type_map
                    .insert((*name).to_string(), *registration);
            }
            debug!(
                entity_sets = self.entity_sets.len(),
                "store published entity set map"
            );
        }

        Ok(None)
    }
}

/// Outermost stage: adds view entity sets and operation descriptors to
/// whatever model the inner stages produced.
pub struct PublisherModelBuilder {
    inner: Box<dyn ModelBuilder>,
    views: Vec<EntitySet>,
    operations: Vec<OperationDescriptor>,
}

impl PublisherModelBuilder {
    pub fn new(
        inner: Box<dyn ModelBuilder>,
        views: Vec<EntitySet>,
        operations: Vec<OperationDescriptor>,
    ) -> Self {
        Self {
            inner,
            views,
            operations,
        }
    }
}

impl ModelBuilder for PublisherModelBuilder {
    fn get_model(&self, context: &mut ModelContext) -> Result<Option<EdmModel>, ModelError> {
        let Some(mut model) = self.inner.get_model(context)? else {
            return Ok(None);
        };

        for view in &self.views {
            if model.entity_type(&view.entity_type).is_none() {
                return Err(ModelError::MissingType(view.entity_type.clone()));
            }
            model.add_entity_set(&view.name, &view.entity_type);
        }
        for operation in &self.operations {
            model.add_operation(operation.clone());
        }

        Ok(Some(model))
    }
}
