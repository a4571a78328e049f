//! Northwind data API: entity sets over an in-memory store, a static
//! permission table, read-only views, three operations and submission hooks.

pub mod configure;
pub mod domain;
pub mod operations;
pub mod permissions;
pub mod query;
pub mod router;
pub mod seed;
pub mod service;
pub mod store;
pub mod submit;
pub mod views;

#[cfg(test)]
mod tests;

pub use configure::{ApiServices, ConfigureStep, NORTHWIND_STEPS};
pub use domain::{
    Customer, Employee, Entity, EntityRef, Order, OrderDetail, Product, Region, Supplier,
};
pub use operations::OperationError;
pub use permissions::{AuthorizationError, PermissionKind, PermissionTable};
pub use query::{OrderBy, Query, QueryOptionError, QueryOptions};
pub use router::{odata_router, ResourcePath, ODATA_PREFIX};
pub use seed::SeedError;
pub use service::{ApiError, EntityCollection, NorthwindApi, UpdateMode};
pub use store::{EntityStore, InMemoryStore, StoreError, Tables};
pub use submit::{
    ChangeAction, ChangeLog, ChangeLogError, HookError, NoopHook, ProductChangeLogger,
    SubmitHook, TracingChangeLog,
};
pub use views::{EntitySetFilter, View};
