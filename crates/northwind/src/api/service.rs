use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::domain::{Customer, Employee, Entity, Order, OrderDetail, Product, Region, Supplier};
use super::operations::{self, OperationError, INCREASE_PRICE, MOST_EXPENSIVE, RESET_DATA_SOURCE};
use super::permissions::{AuthorizationError, PermissionKind, PermissionTable};
use super::query::{Query, QueryOptionError, QueryOptions};
use super::seed::{self, SeedError};
use super::store::{EntityStore, StoreError};
use super::submit::{observe, ChangeAction, SubmitHook};
use super::views::{self, EntitySetFilter, View};
use crate::config::ApiConfig;
use crate::model::EdmModel;

/// Resolves an entity-set name to its Rust type and evaluates `$body` with
/// `$ty` bound to that type. Names are matched exactly.
macro_rules! with_entity_type {
    ($name:expr, $ty:ident => $body:expr) => {
        match $name {
            name if name == Customer::ENTITY_SET => {
                type $ty = Customer;
                $body
            }
            name if name == Product::ENTITY_SET => {
                type $ty = Product;
                $body
            }
            name if name == Order::ENTITY_SET => {
                type $ty = Order;
                $body
            }
            name if name == OrderDetail::ENTITY_SET => {
                type $ty = OrderDetail;
                $body
            }
            name if name == Supplier::ENTITY_SET => {
                type $ty = Supplier;
                $body
            }
            name if name == Employee::ENTITY_SET => {
                type $ty = Employee;
                $body
            }
            name if name == Region::ENTITY_SET => {
                type $ty = Region;
                $body
            }
            other => Err(ApiError::UnknownResource(other.to_string())),
        }
    };
}

/// How an update payload is applied to the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Only the properties present in the payload change.
    Merge,
    /// The payload is the complete new record.
    Replace,
}

/// One page of an entity set or view, serialized with published names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityCollection {
    pub entity_set: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub rows: Vec<Value>,
}

/// Facade every request goes through: permission checks first, then the
/// store, views, operations and submission hooks.
pub struct NorthwindApi<S, H> {
    store: Arc<S>,
    hooks: Arc<H>,
    permissions: Arc<PermissionTable>,
    model: Arc<EdmModel>,
    config: ApiConfig,
}

impl<S, H> NorthwindApi<S, H>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    pub fn new(
        store: Arc<S>,
        hooks: Arc<H>,
        permissions: Arc<PermissionTable>,
        model: Arc<EdmModel>,
        config: ApiConfig,
    ) -> Self {
        Self {
            store,
            hooks,
            permissions,
            model,
            config,
        }
    }

    pub fn model(&self) -> &EdmModel {
        &self.model
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    pub fn authorize(&self, target: &str, permission: PermissionKind) -> Result<(), ApiError> {
        self.permissions.authorize(target, permission).map_err(|err| {
            warn!(resource = %err.target, permission = %err.permission, "access denied");
            ApiError::from(err)
        })
    }

    // Typed surface.

    /// Readable rows of `T`'s entity set, after the entity-set filter.
    pub fn source<T: EntitySetFilter>(&self) -> Result<Query<T>, ApiError> {
        self.authorize(T::ENTITY_SET, PermissionKind::Read)?;
        self.visible_source::<T>()
    }

    fn visible_source<T: EntitySetFilter>(&self) -> Result<Query<T>, ApiError> {
        Ok(Query::from_source(self.store.source::<T>()?).filter(T::visible))
    }

    pub fn expensive_products(&self) -> Result<Query<Product>, ApiError> {
        self.authorize_view(View::ExpensiveProducts)?;
        Ok(views::expensive_products(self.visible_source::<Product>()?))
    }

    pub fn current_orders(&self) -> Result<Query<Order>, ApiError> {
        self.authorize_view(View::CurrentOrders)?;
        Ok(views::current_orders(self.visible_source::<Order>()?))
    }

    fn authorize_view(&self, view: View) -> Result<(), ApiError> {
        self.authorize(view.name(), PermissionKind::Read)?;
        self.authorize(view.source_set(), PermissionKind::Read)
    }

    /// Single readable record; hidden records look missing.
    pub fn lookup<T: EntitySetFilter>(&self, key: &T::Key) -> Result<Option<T>, ApiError> {
        self.authorize(T::ENTITY_SET, PermissionKind::Read)?;
        Ok(self.store.find::<T>(key)?.filter(|row| row.visible()))
    }

    pub fn insert_entity<T: EntitySetFilter>(&self, row: T) -> Result<T, ApiError> {
        self.authorize(T::ENTITY_SET, PermissionKind::Create)?;
        self.admit_insert(&row)?;
        self.persist_insert(row)
    }

    pub fn update_entity<T: EntitySetFilter>(&self, row: T) -> Result<T, ApiError> {
        self.authorize(T::ENTITY_SET, PermissionKind::Update)?;
        self.existing::<T>(&row.key())?;
        ensure_visible(&row)?;
        self.persist_update(row)
    }

    pub fn delete_entity<T: EntitySetFilter>(&self, key: &T::Key) -> Result<(), ApiError> {
        self.authorize(T::ENTITY_SET, PermissionKind::Delete)?;
        let row = self.existing::<T>(key)?;
        self.persist_delete(row)
    }

    fn existing<T: EntitySetFilter>(&self, key: &T::Key) -> Result<T, ApiError> {
        self.store
            .find::<T>(key)?
            .filter(|row| row.visible())
            .ok_or_else(|| not_found::<T>(key))
    }

    /// A new row must stay inside the entity-set filter, and a hidden row
    /// holding the same key answers as missing rather than as a conflict.
    fn admit_insert<T: EntitySetFilter>(&self, row: &T) -> Result<(), ApiError> {
        ensure_visible(row)?;
        match self.store.find::<T>(&row.key())? {
            Some(current) if !current.visible() => Err(not_found::<T>(&row.key())),
            _ => Ok(()),
        }
    }

    fn persist_insert<T: Entity>(&self, row: T) -> Result<T, ApiError> {
        let action = ChangeAction::Insert;
        let result = self.hooks.on_changing(action, row.as_entity_ref());
        observe("changing", action, row.as_entity_ref(), result);
        let stored = self.store.insert(row)?;
        let result = self.hooks.on_changed(action, stored.as_entity_ref());
        observe("changed", action, stored.as_entity_ref(), result);
        info!(entity_set = T::ENTITY_SET, key = ?stored.key(), "entity inserted");
        Ok(stored)
    }

    fn persist_update<T: Entity>(&self, row: T) -> Result<T, ApiError> {
        let action = ChangeAction::Update;
        let result = self.hooks.on_changing(action, row.as_entity_ref());
        observe("changing", action, row.as_entity_ref(), result);
        self.store.update(row.clone())?;
        let result = self.hooks.on_changed(action, row.as_entity_ref());
        observe("changed", action, row.as_entity_ref(), result);
        info!(entity_set = T::ENTITY_SET, key = ?row.key(), "entity updated");
        Ok(row)
    }

    fn persist_delete<T: Entity>(&self, row: T) -> Result<(), ApiError> {
        let action = ChangeAction::Delete;
        let result = self.hooks.on_changing(action, row.as_entity_ref());
        observe("changing", action, row.as_entity_ref(), result);
        self.store.delete::<T>(&row.key())?;
        let result = self.hooks.on_changed(action, row.as_entity_ref());
        observe("changed", action, row.as_entity_ref(), result);
        info!(entity_set = T::ENTITY_SET, key = ?row.key(), "entity deleted");
        Ok(())
    }

    // Operations.

    /// Bound action: adjusts one product's price and persists it through the
    /// update pipeline.
    pub fn increase_price(&self, product_id: i32, diff: i32) -> Result<Product, ApiError> {
        self.authorize(INCREASE_PRICE, PermissionKind::Execute)?;
        self.authorize(Product::ENTITY_SET, PermissionKind::Update)?;

        let mut product = self.existing::<Product>(&product_id)?;
        let price = operations::increase_price(&mut product, diff)?;
        info!(product_id, diff, price, "product price adjusted");
        self.persist_update(product)
    }

    /// Unbound action: restores every table to the embedded seed rows.
    pub fn reset_data_source(&self) -> Result<(), ApiError> {
        self.authorize(RESET_DATA_SOURCE, PermissionKind::Execute)?;
        let tables = seed::northwind()?;
        self.store.reset(tables)?;
        info!("data source reset to seed rows");
        Ok(())
    }

    /// Bound function over the readable `Products` collection.
    pub fn most_expensive(&self) -> Result<Option<f64>, ApiError> {
        self.authorize(MOST_EXPENSIVE, PermissionKind::Execute)?;
        let products = self.source::<Product>()?.execute();
        Ok(operations::most_expensive(&products))
    }

    // Name-addressed surface used by the HTTP router.

    pub fn query(&self, name: &str, options: &QueryOptions) -> Result<EntityCollection, ApiError> {
        debug!(name, ?options, "collection query");
        match View::from_name(name) {
            Some(View::ExpensiveProducts) => {
                self.collect(name, self.expensive_products()?, options)
            }
            Some(View::CurrentOrders) => self.collect(name, self.current_orders()?, options),
            None => with_entity_type!(name, T => {
                let query = self.source::<T>()?;
                self.collect(name, query, options)
            }),
        }
    }

    pub fn get(
        &self,
        name: &str,
        raw_key: &str,
        options: &QueryOptions,
    ) -> Result<Value, ApiError> {
        let row = match View::from_name(name) {
            Some(View::ExpensiveProducts) => {
                let key = parse_key::<Product>(name, raw_key)?;
                let query = self.expensive_products()?;
                first_with_key(name, raw_key, query, key)?
            }
            Some(View::CurrentOrders) => {
                let key = parse_key::<Order>(name, raw_key)?;
                let query = self.current_orders()?;
                first_with_key(name, raw_key, query, key)?
            }
            None => with_entity_type!(name, T => {
                let key = parse_key::<T>(name, raw_key)?;
                self.lookup::<T>(&key)?
                    .ok_or_else(|| ApiError::NotFound {
                        entity_set: name.to_string(),
                        key: raw_key.to_string(),
                    })
                    .and_then(|row| to_json(&row))
            })?,
        };

        let type_name = self.entity_type_of(name)?;
        self.expand(type_name, row, &options.expand)
    }

    /// Follows a navigation property from one record.
    pub fn navigate(&self, name: &str, raw_key: &str, property: &str) -> Result<Value, ApiError> {
        let row = self.get(name, raw_key, &QueryOptions::default())?;
        let type_name = self.entity_type_of(name)?;
        self.navigation_property(type_name, property)?;
        self.related(type_name, property, &row)
    }

    pub fn insert(&self, name: &str, body: Value) -> Result<Value, ApiError> {
        self.ensure_writable(name, PermissionKind::Create)?;
        with_entity_type!(name, T => {
            let row: T = from_json(body)?;
            self.admit_insert(&row)?;
            let stored = self.persist_insert(row)?;
            to_json(&stored)
        })
    }

    pub fn update(
        &self,
        name: &str,
        raw_key: &str,
        body: Value,
        mode: UpdateMode,
    ) -> Result<Value, ApiError> {
        self.ensure_writable(name, PermissionKind::Update)?;
        with_entity_type!(name, T => {
            let key = parse_key::<T>(name, raw_key)?;
            let current = self.existing::<T>(&key)?;
            let payload = match mode {
                UpdateMode::Replace => body,
                UpdateMode::Merge => merge(to_json(&current)?, body)?,
            };
            let row: T = from_json(payload)?;
            if row.key() != key {
                return Err(ApiError::KeyMismatch {
                    entity_set: name.to_string(),
                    key: raw_key.to_string(),
                });
            }
            ensure_visible(&row)?;
            let stored = self.persist_update(row)?;
            to_json(&stored)
        })
    }

    pub fn delete(&self, name: &str, raw_key: &str) -> Result<(), ApiError> {
        self.ensure_writable(name, PermissionKind::Delete)?;
        with_entity_type!(name, T => {
            let key = parse_key::<T>(name, raw_key)?;
            let row = self.existing::<T>(&key)?;
            self.persist_delete(row)
        })
    }

    /// The published model, restricted to names carrying an Inspect grant.
    pub fn metadata(&self) -> EdmModel {
        let mut model = (*self.model).clone();
        model
            .entity_sets
            .retain(|set| self.permissions.allows(&set.name, PermissionKind::Inspect));
        model
            .operations
            .retain(|op| self.permissions.allows(&op.name, PermissionKind::Inspect));
        let visible_types: Vec<String> = model
            .entity_sets
            .iter()
            .map(|set| set.entity_type.clone())
            .collect();
        model
            .entity_types
            .retain(|ty| visible_types.contains(&ty.name));
        model
    }

    /// Entity sets and views a client may discover.
    pub fn service_document(&self) -> Value {
        let sets: Vec<Value> = self
            .model
            .entity_sets
            .iter()
            .filter(|set| self.permissions.allows(&set.name, PermissionKind::Inspect))
            .map(|set| {
                serde_json::json!({
                    "name": set.name,
                    "kind": "EntitySet",
                    "url": set.name,
                })
            })
            .collect();
        serde_json::json!({
            "namespace": self.model.namespace,
            "value": sets,
        })
    }

    /// Checks a write against `name` before any payload is decoded.
    pub fn ensure_writable(&self, name: &str, permission: PermissionKind) -> Result<(), ApiError> {
        if let Some(view) = View::from_name(name) {
            return Err(ApiError::ReadOnlyView(view.name().to_string()));
        }
        if self.model.entity_set(name).is_none() {
            return Err(ApiError::UnknownResource(name.to_string()));
        }
        self.authorize(name, permission)
    }

    fn entity_type_of(&self, name: &str) -> Result<&str, ApiError> {
        self.model
            .entity_set(name)
            .map(|set| set.entity_type.as_str())
            .ok_or_else(|| ApiError::UnknownResource(name.to_string()))
    }

    fn navigation_property(&self, type_name: &str, property: &str) -> Result<(), ApiError> {
        self.model
            .entity_type(type_name)
            .and_then(|ty| ty.navigation_property(property))
            .map(|_| ())
            .ok_or_else(|| ApiError::UnknownNavigation {
                entity_type: type_name.to_string(),
                property: property.to_string(),
            })
    }

    fn collect<T: Entity>(
        &self,
        name: &str,
        query: Query<T>,
        options: &QueryOptions,
    ) -> Result<EntityCollection, ApiError> {
        let type_name = self.entity_type_of(name)?;
        if let Some(order_by) = &options.order_by {
            let sortable = self
                .model
                .entity_type(type_name)
                .map_or(false, |ty| ty.has_property(&order_by.property));
            if !sortable {
                return Err(ApiError::QueryOption(QueryOptionError::InvalidOrderBy(
                    order_by.property.clone(),
                )));
            }
        }

        let count = options.count.then(|| query.count());
        let rows = query
            .execute()
            .iter()
            .map(to_json)
            .collect::<Result<Vec<_>, _>>()?;
        let rows = options
            .page(rows, self.config.max_page_size)
            .into_iter()
            .map(|row| self.expand(type_name, row, &options.expand))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EntityCollection {
            entity_set: name.to_string(),
            count,
            rows,
        })
    }

    /// Inlines auto-expanded navigation properties plus any requested ones.
    fn expand(
        &self,
        type_name: &str,
        mut row: Value,
        requested: &[String],
    ) -> Result<Value, ApiError> {
        let mut properties: Vec<String> = self
            .model
            .auto_expand_properties(type_name)
            .into_iter()
            .map(|property| property.name.clone())
            .collect();
        for property in requested {
            self.navigation_property(type_name, property)?;
            if !properties.contains(property) {
                properties.push(property.clone());
            }
        }

        for property in properties {
            let related = self.related(type_name, &property, &row)?;
            if let Value::Object(fields) = &mut row {
                fields.insert(property, related);
            }
        }
        Ok(row)
    }

    fn related(&self, type_name: &str, property: &str, row: &Value) -> Result<Value, ApiError> {
        if type_name == Order::TYPE_NAME && property == "Order_Details" {
            let order_id = row["OrderID"].as_i64();
            let details = self
                .source::<OrderDetail>()?
                .filter(move |detail| Some(i64::from(detail.order_id)) == order_id)
                .execute();
            return to_json(&details);
        }
        if type_name == Order::TYPE_NAME && property == "Customer" {
            return match row["CustomerID"].as_str() {
                Some(customer_id) => self.related_one::<Customer>(&customer_id.to_string()),
                None => Ok(Value::Null),
            };
        }
        if type_name == OrderDetail::TYPE_NAME && property == "Product" {
            return match row["ProductID"].as_i64().and_then(|id| i32::try_from(id).ok()) {
                Some(product_id) => self.related_one::<Product>(&product_id),
                None => Ok(Value::Null),
            };
        }
        if type_name == Product::TYPE_NAME && property == "Supplier" {
            return match row["SupplierID"].as_i64().and_then(|id| i32::try_from(id).ok()) {
                Some(supplier_id) => self.related_one::<Supplier>(&supplier_id),
                None => Ok(Value::Null),
            };
        }

        Err(ApiError::UnknownNavigation {
            entity_type: type_name.to_string(),
            property: property.to_string(),
        })
    }

    fn related_one<T: EntitySetFilter>(&self, key: &T::Key) -> Result<Value, ApiError> {
        match self.lookup::<T>(key)? {
            Some(row) => to_json(&row),
            None => Ok(Value::Null),
        }
    }
}

fn not_found<T: Entity>(key: &T::Key) -> ApiError {
    ApiError::NotFound {
        entity_set: T::ENTITY_SET.to_string(),
        key: format!("{key:?}"),
    }
}

/// Writes may not move a row outside its entity-set filter.
fn ensure_visible<T: EntitySetFilter>(row: &T) -> Result<(), ApiError> {
    if row.visible() {
        Ok(())
    } else {
        Err(not_found::<T>(&row.key()))
    }
}

fn parse_key<T: Entity>(name: &str, raw_key: &str) -> Result<T::Key, ApiError> {
    T::parse_key(raw_key).ok_or_else(|| ApiError::InvalidKey {
        entity_set: name.to_string(),
        key: raw_key.to_string(),
    })
}

fn first_with_key<T: Entity>(
    name: &str,
    raw_key: &str,
    query: Query<T>,
    key: T::Key,
) -> Result<Value, ApiError> {
    let row = query
        .filter(move |row| row.key() == key)
        .execute()
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::NotFound {
            entity_set: name.to_string(),
            key: raw_key.to_string(),
        })?;
    to_json(&row)
}

fn to_json<T: Serialize>(row: &T) -> Result<Value, ApiError> {
    serde_json::to_value(row).map_err(|err| ApiError::Serialization(err.to_string()))
}

fn from_json<T: Entity>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|err| ApiError::InvalidPayload(err.to_string()))
}

fn merge(current: Value, patch: Value) -> Result<Value, ApiError> {
    let (Value::Object(mut fields), Value::Object(changes)) = (current, patch) else {
        return Err(ApiError::InvalidPayload(
            "merge payload must be a JSON object".to_string(),
        ));
    };
    for (name, value) in changes {
        fields.insert(name, value);
    }
    Ok(Value::Object(fields))
}

/// Wraps a scalar operation result the way collections wrap rows.
pub fn scalar_payload(value: Option<f64>) -> Value {
    let mut payload = Map::new();
    payload.insert(
        "value".to_string(),
        value.map_or(Value::Null, Value::from),
    );
    Value::Object(payload)
}

/// Error raised by the data API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Unauthorized(#[from] AuthorizationError),
    #[error("resource `{0}` does not exist")]
    UnknownResource(String),
    #[error("`{entity_type}` has no navigation property `{property}`")]
    UnknownNavigation {
        entity_type: String,
        property: String,
    },
    #[error("`{entity_set}` has no entity with key `{key}`")]
    NotFound { entity_set: String, key: String },
    #[error("`{key}` is not a valid key for `{entity_set}`")]
    InvalidKey { entity_set: String, key: String },
    #[error("payload key does not match `{entity_set}({key})`")]
    KeyMismatch { entity_set: String, key: String },
    #[error("view `{0}` is read-only")]
    ReadOnlyView(String),
    #[error("{0} is not supported on this resource")]
    MethodNotAllowed(String),
    #[error(transparent)]
    QueryOption(#[from] QueryOptionError),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Seed(#[from] SeedError),
    #[error("failed to serialize response: {0}")]
    Serialization(String),
}
