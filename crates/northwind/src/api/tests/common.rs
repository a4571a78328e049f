use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use serde_json::Value;

use crate::api::configure::ApiServices;
use crate::api::domain::{EntityRef, Product};
use crate::api::router::odata_router;
use crate::api::seed;
use crate::api::service::NorthwindApi;
use crate::api::store::{EntityStore, InMemoryStore, StoreError, Tables};
use crate::api::submit::{ChangeAction, HookError, SubmitHook};
use crate::api::Entity;
use crate::config::ApiConfig;

pub(super) type TestApi = NorthwindApi<InMemoryStore, RecordingHook>;

/// One observed hook call: stage, action, entity set and debug key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct HookCall {
    pub(super) stage: &'static str,
    pub(super) action: ChangeAction,
    pub(super) entity_set: &'static str,
    pub(super) key: String,
}

#[derive(Default)]
pub(super) struct RecordingHook {
    calls: Mutex<Vec<HookCall>>,
    fail: bool,
}

impl RecordingHook {
    pub(super) fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(super) fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().expect("hook mutex poisoned").clone()
    }

    fn record(
        &self,
        stage: &'static str,
        action: ChangeAction,
        entity: EntityRef<'_>,
    ) -> Result<(), HookError> {
        let key = match entity {
            EntityRef::Customer(row) => format!("{:?}", row.key()),
            EntityRef::Product(row) => format!("{:?}", row.key()),
            EntityRef::Order(row) => format!("{:?}", row.key()),
            EntityRef::OrderDetail(row) => format!("{:?}", row.key()),
            EntityRef::Supplier(row) => format!("{:?}", row.key()),
            EntityRef::Employee(row) => format!("{:?}", row.key()),
            EntityRef::Region(row) => format!("{:?}", row.key()),
        };
        self.calls
            .lock()
            .expect("hook mutex poisoned")
            .push(HookCall {
                stage,
                action,
                entity_set: entity.entity_set(),
                key,
            });

        if self.fail {
            Err(HookError::Other(format!("{stage} hook rejected")))
        } else {
            Ok(())
        }
    }
}

impl SubmitHook for RecordingHook {
    fn on_changing(&self, action: ChangeAction, entity: EntityRef<'_>) -> Result<(), HookError> {
        self.record("changing", action, entity)
    }

    fn on_changed(&self, action: ChangeAction, entity: EntityRef<'_>) -> Result<(), HookError> {
        self.record("changed", action, entity)
    }
}

/// Store whose every call fails, for error-path coverage.
pub(super) struct UnavailableStore;

impl EntityStore for UnavailableStore {
    fn source<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn find<T: Entity>(&self, _key: &T::Key) -> Result<Option<T>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn insert<T: Entity>(&self, _row: T) -> Result<T, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn update<T: Entity>(&self, _row: T) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn delete<T: Entity>(&self, _key: &T::Key) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn reset(&self, _tables: Tables) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn seeded_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new(seed::northwind().expect("seed data parses")))
}

pub(super) fn build_api_with(
    hooks: RecordingHook,
    config: ApiConfig,
) -> (Arc<TestApi>, Arc<InMemoryStore>, Arc<RecordingHook>) {
    let store = seeded_store();
    let hooks = Arc::new(hooks);
    let api = ApiServices::northwind(config)
        .into_api(store.clone(), hooks.clone())
        .expect("api builds");
    (Arc::new(api), store, hooks)
}

pub(super) fn build_api() -> (Arc<TestApi>, Arc<InMemoryStore>, Arc<RecordingHook>) {
    build_api_with(RecordingHook::default(), ApiConfig::default())
}

pub(super) fn router() -> (axum::Router, Arc<InMemoryStore>, Arc<RecordingHook>) {
    let (api, store, hooks) = build_api();
    (odata_router(api), store, hooks)
}

pub(super) fn stored_product(store: &InMemoryStore, id: i32) -> Option<Product> {
    store.find::<Product>(&id).expect("store readable")
}

pub(super) fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).expect("json body")))
            .expect("request builds"),
        None => builder.body(Body::empty()).expect("request builds"),
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn ids(rows: &[Value], property: &str) -> Vec<i64> {
    rows.iter()
        .filter_map(|row| row[property].as_i64())
        .collect()
}
