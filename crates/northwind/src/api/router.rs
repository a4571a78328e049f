use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use super::domain::{Entity, Product};
use super::operations::{INCREASE_PRICE, MOST_EXPENSIVE, RESET_DATA_SOURCE};
use super::permissions::PermissionKind;
use super::query::QueryOptions;
use super::service::{scalar_payload, ApiError, EntityCollection, NorthwindApi, UpdateMode};
use super::store::{EntityStore, StoreError};
use super::submit::SubmitHook;

/// Mount prefix for every data route.
pub const ODATA_PREFIX: &str = "/odata";

pub fn odata_router<S, H>(api: Arc<NorthwindApi<S, H>>) -> Router
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    Router::new()
        .route("/odata", get(service_document_handler::<S, H>))
        .route("/odata/$metadata", get(metadata_handler::<S, H>))
        .route(
            "/odata/:segment",
            get(read_handler::<S, H>)
                .post(create_handler::<S, H>)
                .patch(merge_handler::<S, H>)
                .put(replace_handler::<S, H>)
                .delete(delete_handler::<S, H>),
        )
        .route(
            "/odata/:segment/:member",
            get(member_read_handler::<S, H>).post(member_action_handler::<S, H>),
        )
        .with_state(api)
}

/// `Name` or `Name(key)` from one path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePath {
    pub name: String,
    pub key: Option<String>,
}

impl ResourcePath {
    pub fn parse(segment: &str) -> Result<Self, ApiError> {
        let segment = segment.trim();
        let Some(open) = segment.find('(') else {
            return Ok(Self {
                name: segment.to_string(),
                key: None,
            });
        };

        let invalid = || ApiError::InvalidKey {
            entity_set: segment[..open].to_string(),
            key: segment[open..].to_string(),
        };
        let inner = segment[open + 1..].strip_suffix(')').ok_or_else(invalid)?;
        if inner.trim().is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            name: segment[..open].to_string(),
            key: Some(inner.to_string()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct IncreasePriceRequest {
    diff: i32,
}

fn collection_payload(collection: EntityCollection) -> Value {
    let mut payload = json!({
        "@odata.context": format!("$metadata#{}", collection.entity_set),
        "value": collection.rows,
    });
    if let (Some(count), Value::Object(fields)) = (collection.count, &mut payload) {
        fields.insert("@odata.count".to_string(), Value::from(count));
    }
    payload
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::InvalidPayload(err.to_string()))
}

fn operation_name(member: &str) -> &str {
    member.strip_suffix("()").unwrap_or(member)
}

async fn service_document_handler<S, H>(State(api): State<Arc<NorthwindApi<S, H>>>) -> Response
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    Json(api.service_document()).into_response()
}

async fn metadata_handler<S, H>(State(api): State<Arc<NorthwindApi<S, H>>>) -> Response
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    Json(api.metadata()).into_response()
}

async fn read_handler<S, H>(
    State(api): State<Arc<NorthwindApi<S, H>>>,
    Path(segment): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    let path = ResourcePath::parse(&segment)?;
    let options = QueryOptions::parse(&params)?;
    match path.key {
        None => {
            let collection = api.query(&path.name, &options)?;
            Ok(Json(collection_payload(collection)).into_response())
        }
        Some(key) => Ok(Json(api.get(&path.name, &key, &options)?).into_response()),
    }
}

async fn create_handler<S, H>(
    State(api): State<Arc<NorthwindApi<S, H>>>,
    Path(segment): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    let path = ResourcePath::parse(&segment)?;
    if path.key.is_some() {
        return Err(ApiError::MethodNotAllowed("POST".to_string()));
    }

    if operation_name(&path.name) == RESET_DATA_SOURCE {
        api.reset_data_source()?;
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    api.ensure_writable(&path.name, PermissionKind::Create)?;
    let payload: Value = parse_body(&body)?;
    let created = api.insert(&path.name, payload)?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn merge_handler<S, H>(
    State(api): State<Arc<NorthwindApi<S, H>>>,
    Path(segment): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    write_entity(&api, &segment, &body, UpdateMode::Merge)
}

async fn replace_handler<S, H>(
    State(api): State<Arc<NorthwindApi<S, H>>>,
    Path(segment): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    write_entity(&api, &segment, &body, UpdateMode::Replace)
}

fn write_entity<S, H>(
    api: &NorthwindApi<S, H>,
    segment: &str,
    body: &Bytes,
    mode: UpdateMode,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    let path = ResourcePath::parse(segment)?;
    let Some(key) = path.key else {
        let method = match mode {
            UpdateMode::Merge => "PATCH",
            UpdateMode::Replace => "PUT",
        };
        return Err(ApiError::MethodNotAllowed(method.to_string()));
    };

    api.ensure_writable(&path.name, PermissionKind::Update)?;
    let payload: Value = parse_body(body)?;
    let updated = api.update(&path.name, &key, payload, mode)?;
    Ok(Json(updated).into_response())
}

async fn delete_handler<S, H>(
    State(api): State<Arc<NorthwindApi<S, H>>>,
    Path(segment): Path<String>,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    let path = ResourcePath::parse(&segment)?;
    let Some(key) = path.key else {
        return Err(ApiError::MethodNotAllowed("DELETE".to_string()));
    };
    api.delete(&path.name, &key)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn member_read_handler<S, H>(
    State(api): State<Arc<NorthwindApi<S, H>>>,
    Path((segment, member)): Path<(String, String)>,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    let path = ResourcePath::parse(&segment)?;
    let member = operation_name(&member);

    match path.key {
        None if path.name == Product::ENTITY_SET && member == MOST_EXPENSIVE => {
            Ok(Json(scalar_payload(api.most_expensive()?)).into_response())
        }
        None => Err(ApiError::UnknownResource(format!("{}/{member}", path.name))),
        Some(key) => Ok(Json(api.navigate(&path.name, &key, member)?).into_response()),
    }
}

async fn member_action_handler<S, H>(
    State(api): State<Arc<NorthwindApi<S, H>>>,
    Path((segment, member)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, ApiError>
where
    S: EntityStore + 'static,
    H: SubmitHook + 'static,
{
    let path = ResourcePath::parse(&segment)?;
    let member = operation_name(&member);

    let key = match path.key {
        Some(key) if path.name == Product::ENTITY_SET && member == INCREASE_PRICE => key,
        _ => return Err(ApiError::MethodNotAllowed("POST".to_string())),
    };

    let product_id = Product::parse_key(&key).ok_or_else(|| ApiError::InvalidKey {
        entity_set: path.name.clone(),
        key: key.clone(),
    })?;
    api.authorize(INCREASE_PRICE, PermissionKind::Execute)?;
    let request: IncreasePriceRequest = parse_body(&body)?;
    let product = api.increase_price(product_id, request.diff)?;
    Ok(Json(product).into_response())
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ApiError::UnknownResource(_)
            | ApiError::UnknownNavigation { .. }
            | ApiError::NotFound { .. }
            | ApiError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            ApiError::ReadOnlyView(_) | ApiError::MethodNotAllowed(_) => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            ApiError::InvalidKey { .. }
            | ApiError::KeyMismatch { .. }
            | ApiError::QueryOption(_)
            | ApiError::InvalidPayload(_)
            | ApiError::Operation(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Conflict) => StatusCode::CONFLICT,
            ApiError::Store(StoreError::Unavailable(_))
            | ApiError::Seed(_)
            | ApiError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "data request failed");
        }

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_keyed_segments() {
        assert_eq!(
            ResourcePath::parse("Products").expect("bare"),
            ResourcePath {
                name: "Products".to_string(),
                key: None,
            }
        );
        assert_eq!(
            ResourcePath::parse("Customers('BONAP')").expect("keyed"),
            ResourcePath {
                name: "Customers".to_string(),
                key: Some("'BONAP'".to_string()),
            }
        );
        assert_eq!(
            ResourcePath::parse("Order_Details(OrderID=10248,ProductID=11)")
                .expect("composite")
                .key
                .as_deref(),
            Some("OrderID=10248,ProductID=11")
        );
    }

    #[test]
    fn rejects_unbalanced_or_empty_keys() {
        assert!(matches!(
            ResourcePath::parse("Products(11"),
            Err(ApiError::InvalidKey { .. })
        ));
        assert!(matches!(
            ResourcePath::parse("Products()"),
            Err(ApiError::InvalidKey { .. })
        ));
    }

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(
            ApiError::ReadOnlyView("CurrentOrders".to_string()).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ApiError::Store(StoreError::Conflict).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::UnknownResource("Shippers".to_string()).status(),
            StatusCode::NOT_FOUND
        );
    }
}
