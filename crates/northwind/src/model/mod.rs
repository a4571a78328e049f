//! Entity-data model published at `$metadata`, and the builder chain that
//! produces it once at startup.

pub mod builder;
pub mod extender;

use serde::{Deserialize, Serialize};

pub use builder::{
    register_entity_set, ConventionModelBuilder, EmptyModelBuilder, EntitySetRegistration,
    ModelBuilder, ModelContext, PublisherModelBuilder, StoreModelBuilder,
};
pub use extender::NorthwindModelExtender;

/// Primitive kinds a structural property can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKind {
    Boolean,
    Int16,
    Int32,
    Single,
    Decimal,
    Double,
    String,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralProperty {
    pub name: String,
    pub kind: PropertyKind,
    pub nullable: bool,
}

/// Query-shape restrictions attached to a navigation property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryableRestrictions {
    pub auto_expand: bool,
    pub not_expandable: bool,
    pub not_navigable: bool,
    pub not_filterable: bool,
    pub not_sortable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "term", rename_all = "snake_case")]
pub enum Annotation {
    QueryableRestrictions(QueryableRestrictions),
}

impl Annotation {
    fn same_term(&self, other: &Annotation) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationProperty {
    pub name: String,
    pub target_type: String,
    pub collection: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Annotation>,
}

impl NavigationProperty {
    /// Sets an annotation value, replacing any earlier value of the same term.
    pub fn set_annotation(&mut self, annotation: Annotation) {
        self.annotations
            .retain(|existing| !existing.same_term(&annotation));
        self.annotations.push(annotation);
    }

    pub fn restrictions(&self) -> Option<&QueryableRestrictions> {
        self.annotations.iter().find_map(|annotation| match annotation {
            Annotation::QueryableRestrictions(restrictions) => Some(restrictions),
        })
    }

    pub fn auto_expand(&self) -> bool {
        self.restrictions()
            .map_or(false, |restrictions| restrictions.auto_expand)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub key: Vec<String>,
    pub properties: Vec<StructuralProperty>,
    pub navigation_properties: Vec<NavigationProperty>,
}

impl EntityType {
    pub fn new(name: &str, key: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            key: key.iter().map(|part| part.to_string()).collect(),
            properties: Vec::new(),
            navigation_properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: &str, kind: PropertyKind, nullable: bool) -> Self {
        self.properties.push(StructuralProperty {
            name: name.to_string(),
            kind,
            nullable,
        });
        self
    }

    pub fn navigation(mut self, name: &str, target_type: &str, collection: bool) -> Self {
        self.navigation_properties.push(NavigationProperty {
            name: name.to_string(),
            target_type: target_type.to_string(),
            collection,
            annotations: Vec::new(),
        });
        self
    }

    pub fn navigation_property(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigation_properties
            .iter()
            .find(|property| property.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|property| property.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// May change state; invoked with POST.
    Action,
    /// Side-effect free; invoked with GET.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBinding {
    pub entity_type: String,
    pub collection: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationParameter {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub kind: OperationKind,
    pub has_side_effects: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<OperationBinding>,
    pub parameters: Vec<OperationParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<PropertyKind>,
}

/// The published schema. Built once, then shared read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdmModel {
    pub namespace: String,
    pub entity_types: Vec<EntityType>,
    pub entity_sets: Vec<EntitySet>,
    pub operations: Vec<OperationDescriptor>,
}

impl EdmModel {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entity_types: Vec::new(),
            entity_sets: Vec::new(),
            operations: Vec::new(),
        }
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.iter().find(|ty| ty.name == name)
    }

    pub fn entity_set(&self, name: &str) -> Option<&EntitySet> {
        self.entity_sets.iter().find(|set| set.name == name)
    }

    pub fn operation(&self, name: &str) -> Option<&OperationDescriptor> {
        self.operations.iter().find(|op| op.name == name)
    }

    pub fn add_entity_set(&mut self, name: &str, entity_type: &str) {
        if self.entity_set(name).is_none() {
            self.entity_sets.push(EntitySet {
                name: name.to_string(),
                entity_type: entity_type.to_string(),
            });
        }
    }

    pub fn add_operation(&mut self, operation: OperationDescriptor) {
        if self.operation(&operation.name).is_none() {
            self.operations.push(operation);
        }
    }

    /// Navigation properties of `type_name` that must always be inlined.
    pub fn auto_expand_properties(&self, type_name: &str) -> Vec<&NavigationProperty> {
        self.entity_type(type_name)
            .map(|ty| {
                ty.navigation_properties
                    .iter()
                    .filter(|property| property.auto_expand())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Fatal schema construction failures.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model builder chain produced no model")]
    NoModel,
    #[error("entity type `{0}` not found in model")]
    MissingType(String),
    #[error("entity type `{0}` declared more than once")]
    AmbiguousType(String),
    #[error("navigation property `{property}` not found on `{entity_type}`")]
    MissingProperty {
        entity_type: String,
        property: String,
    },
    #[error("navigation property `{property}` declared more than once on `{entity_type}`")]
    AmbiguousProperty {
        entity_type: String,
        property: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_annotation_replaces_same_term() {
        let mut property = NavigationProperty {
            name: "Order_Details".to_string(),
            target_type: "Order_Detail".to_string(),
            collection: true,
            annotations: Vec::new(),
        };

        property.set_annotation(Annotation::QueryableRestrictions(QueryableRestrictions {
            not_sortable: true,
            ..QueryableRestrictions::default()
        }));
        property.set_annotation(Annotation::QueryableRestrictions(QueryableRestrictions {
            auto_expand: true,
            ..QueryableRestrictions::default()
        }));

        assert_eq!(property.annotations.len(), 1);
        assert!(property.auto_expand());
        assert!(!property.restrictions().expect("restrictions").not_sortable);
    }

    #[test]
    fn model_ignores_duplicate_entity_sets() {
        let mut model = EdmModel::new("Test");
        model.add_entity_set("Products", "Product");
        model.add_entity_set("Products", "Product");
        assert_eq!(model.entity_sets.len(), 1);
    }
}
