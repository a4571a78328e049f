use tracing::{debug, info};

use super::{
    Annotation, ConventionModelBuilder, EdmModel, ModelBuilder, ModelContext, ModelError,
    QueryableRestrictions,
};

/// Type and navigation property that always carry the auto-expand restriction.
pub const AUTO_EXPAND_TYPE: &str = "Order";
pub const AUTO_EXPAND_PROPERTY: &str = "Order_Details";

/// Stage sitting between the store provider and the publisher.
///
/// When the inner stages only produced an entity-set map it materialises the
/// sets and clears the map, so a later run does not rebuild. Whichever branch
/// produced the model, `Order.Order_Details` leaves here annotated to
/// auto-expand.
pub struct NorthwindModelExtender {
    inner: Box<dyn ModelBuilder>,
}

impl NorthwindModelExtender {
    pub fn new(inner: Box<dyn ModelBuilder>) -> Self {
        Self { inner }
    }
}

impl ModelBuilder for NorthwindModelExtender {
    fn get_model(&self, context: &mut ModelContext) -> Result<Option<EdmModel>, ModelError> {
        let mut model = match self.inner.get_model(context)? {
            Some(model) => model,
            None => {
                if context.entity_set_type_map.is_empty() {
                    return Ok(None);
                }

                let mut builder = ConventionModelBuilder::new(context.namespace.clone());
                for (name, registration) in &context.entity_set_type_map {
                    registration.apply(&mut builder, name);
                }
                let synthesized = context.entity_set_type_map.len();
                context.entity_set_type_map.clear();
                debug!(synthesized, "synthesized entity sets from store map");
                builder.get_edm_model()
            }
        };

        enable_auto_expand(&mut model, AUTO_EXPAND_TYPE, AUTO_EXPAND_PROPERTY)?;
        info!(
            entity_type = AUTO_EXPAND_TYPE,
            property = AUTO_EXPAND_PROPERTY,
            "navigation property set to auto-expand"
        );

        Ok(Some(model))
    }
}

/// Locates exactly one entity type and exactly one navigation property on it
/// and marks the property auto-expand.
pub fn enable_auto_expand(
    model: &mut EdmModel,
    type_name: &str,
    property_name: &str,
) -> Result<(), ModelError> {
    let mut types = model
        .entity_types
        .iter_mut()
        .filter(|ty| ty.name == type_name);
    let entity_type = types
        .next()
        .ok_or_else(|| ModelError::MissingType(type_name.to_string()))?;
    if types.next().is_some() {
        return Err(ModelError::AmbiguousType(type_name.to_string()));
    }

    let mut properties = entity_type
        .navigation_properties
        .iter_mut()
        .filter(|property| property.name == property_name);
    let property = properties
        .next()
        .ok_or_else(|| ModelError::MissingProperty {
            entity_type: type_name.to_string(),
            property: property_name.to_string(),
        })?;
    if properties.next().is_some() {
        return Err(ModelError::AmbiguousProperty {
            entity_type: type_name.to_string(),
            property: property_name.to_string(),
        });
    }

    property.set_annotation(Annotation::QueryableRestrictions(QueryableRestrictions {
        auto_expand: true,
        ..QueryableRestrictions::default()
    }));
    Ok(())
}
