use std::sync::Arc;

use serde_json::json;

use super::common::*;
use crate::api::configure::ApiServices;
use crate::api::domain::{Customer, Product};
use crate::api::operations::OperationError;
use crate::api::permissions::{PermissionKind, PermissionTable};
use crate::api::query::{OrderBy, QueryOptions};
use crate::api::seed;
use crate::api::service::{ApiError, NorthwindApi, UpdateMode};
use crate::api::store::{EntityStore, StoreError};
use crate::api::submit::{ChangeAction, NoopHook};
use crate::config::ApiConfig;

#[test]
fn expensive_products_view_returns_products_above_fifty() {
    let (api, _, _) = build_api();

    let mut ids: Vec<i32> = api
        .expensive_products()
        .expect("view readable")
        .execute()
        .into_iter()
        .map(|product| product.product_id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![9, 18, 20, 29, 38, 51, 59]);

    let collection = api
        .query("ExpensiveProducts", &QueryOptions::default())
        .expect("view query");
    assert_eq!(collection.rows.len(), 7);
}

#[test]
fn current_orders_view_returns_unshipped_orders() {
    let (api, _, _) = build_api();

    let collection = api
        .query("CurrentOrders", &QueryOptions::default())
        .expect("view query");
    assert_eq!(
        ids(&collection.rows, "OrderID"),
        vec![11008, 11019, 11072, 11076]
    );
    assert!(collection
        .rows
        .iter()
        .all(|row| row["ShippedDate"].is_null()));
}

#[test]
fn customers_are_limited_to_france() {
    let (api, _, _) = build_api();

    let customers: Vec<String> = api
        .source::<Customer>()
        .expect("customers readable")
        .execute()
        .into_iter()
        .map(|customer| customer.customer_id)
        .collect();
    assert_eq!(customers, vec!["BLONP", "BONAP", "DUMON", "VINET"]);

    let hidden = api
        .get("Customers", "'ALFKI'", &QueryOptions::default())
        .expect_err("German customer is hidden");
    assert!(matches!(hidden, ApiError::NotFound { .. }));

    let deleted = api
        .delete("Customers", "'ALFKI'")
        .expect_err("hidden customer cannot be deleted");
    assert!(matches!(deleted, ApiError::NotFound { .. }));
}

#[test]
fn customer_writes_stay_inside_the_france_filter() {
    let (api, store, hooks) = build_api();

    let shadowed = api
        .insert(
            "Customers",
            json!({
                "CustomerID": "ALFKI",
                "CompanyName": "Alfreds",
                "CountryRegion": "France",
            }),
        )
        .expect_err("hidden key answers as missing");
    assert!(matches!(shadowed, ApiError::NotFound { .. }));

    let outside = api
        .insert(
            "Customers",
            json!({
                "CustomerID": "ZZZZZ",
                "CompanyName": "Zum Zoo",
                "CountryRegion": "Germany",
            }),
        )
        .expect_err("customer outside France is rejected");
    assert!(matches!(outside, ApiError::NotFound { .. }));
    assert!(store
        .snapshot()
        .expect("snapshot")
        .customers
        .get("ZZZZZ")
        .is_none());

    let moved = api
        .update(
            "Customers",
            "'BLONP'",
            json!({"CountryRegion": "Germany"}),
            UpdateMode::Merge,
        )
        .expect_err("update may not hide the row");
    assert!(matches!(moved, ApiError::NotFound { .. }));
    assert!(hooks.calls().is_empty());

    let created = api
        .insert(
            "Customers",
            json!({
                "CustomerID": "FRANR",
                "CompanyName": "France restauration",
                "CountryRegion": "France",
            }),
        )
        .expect("french customer inserted");
    assert_eq!(created["CustomerID"], "FRANR");
    assert!(api
        .get("Customers", "'FRANR'", &QueryOptions::default())
        .is_ok());
}

#[test]
fn suppliers_are_readable_but_not_writable() {
    let (api, store, hooks) = build_api();

    let suppliers = api
        .query("Suppliers", &QueryOptions::default())
        .expect("suppliers readable");
    assert_eq!(suppliers.rows.len(), 8);

    let insert = api
        .insert(
            "Suppliers",
            json!({"SupplierID": 99, "CompanyName": "Nouvelle Maison"}),
        )
        .expect_err("insert denied");
    assert!(matches!(
        insert,
        ApiError::Unauthorized(ref err) if err.permission == PermissionKind::Create
    ));

    let delete = api.delete("Suppliers", "1").expect_err("delete denied");
    assert!(matches!(delete, ApiError::Unauthorized(_)));

    let detail = api
        .insert(
            "Order_Details",
            json!({"OrderID": 10248, "ProductID": 1, "UnitPrice": 18, "Quantity": 1}),
        )
        .expect_err("order details are read-only");
    assert!(matches!(detail, ApiError::Unauthorized(_)));

    assert_eq!(store.snapshot().expect("snapshot").suppliers.len(), 8);
    assert!(hooks.calls().is_empty(), "denied writes never reach hooks");
}

#[test]
fn denied_writes_are_rejected_before_payload_parsing() {
    let (api, _, _) = build_api();

    let err = api
        .insert("Suppliers", json!("not an object"))
        .expect_err("denied");
    assert!(matches!(err, ApiError::Unauthorized(_)));
}

#[test]
fn views_reject_writes() {
    let (api, _, _) = build_api();

    let insert = api
        .insert("ExpensiveProducts", json!({"ProductID": 100, "ProductName": "Caviar"}))
        .expect_err("view insert");
    assert!(matches!(insert, ApiError::ReadOnlyView(name) if name == "ExpensiveProducts"));

    let update = api
        .update(
            "CurrentOrders",
            "11008",
            json!({"ShipCountry": "Austria"}),
            UpdateMode::Merge,
        )
        .expect_err("view update");
    assert!(matches!(update, ApiError::ReadOnlyView(_)));
}

#[test]
fn increase_price_persists_and_fires_update_hooks() {
    let (api, store, hooks) = build_api();

    let product = api.increase_price(1, 2).expect("price increased");
    assert_eq!(product.unit_price, Some(20.0));
    assert_eq!(
        stored_product(&store, 1).and_then(|row| row.unit_price),
        Some(20.0)
    );

    let calls = hooks.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].stage, "changing");
    assert_eq!(calls[1].stage, "changed");
    assert!(calls
        .iter()
        .all(|call| call.action == ChangeAction::Update && call.entity_set == "Products"));
    assert_eq!(calls[0].key, "1");
}

#[test]
fn increase_price_moves_products_into_the_expensive_view() {
    let (api, _, _) = build_api();

    api.increase_price(62, 1).expect("price increased");
    let ids: Vec<i32> = api
        .expensive_products()
        .expect("view readable")
        .execute()
        .into_iter()
        .map(|product| product.product_id)
        .collect();
    assert!(ids.contains(&62));
}

#[test]
fn increase_price_rejects_invalid_adjustments() {
    let (api, store, hooks) = build_api();

    let unpriced = api.increase_price(77, 5).expect_err("no price");
    assert!(matches!(
        unpriced,
        ApiError::Operation(OperationError::MissingPrice(77))
    ));

    let negative = api.increase_price(3, -11).expect_err("negative price");
    assert!(matches!(
        negative,
        ApiError::Operation(OperationError::NegativePrice { product_id: 3, .. })
    ));
    assert_eq!(
        stored_product(&store, 3).and_then(|row| row.unit_price),
        Some(10.0)
    );

    let missing = api.increase_price(4242, 1).expect_err("unknown product");
    assert!(matches!(missing, ApiError::NotFound { .. }));
    assert!(hooks.calls().is_empty());
}

#[test]
fn most_expensive_tracks_live_prices() {
    let (api, _, _) = build_api();

    assert_eq!(api.most_expensive().expect("function runs"), Some(263.5));

    api.delete("Products", "38").expect("delete product");
    assert_eq!(api.most_expensive().expect("function runs"), Some(123.79));
}

#[test]
fn reset_data_source_restores_seed_rows() {
    let (api, store, _) = build_api();

    api.delete("Products", "1").expect("delete");
    api.increase_price(2, 100).expect("increase");
    api.insert(
        "Regions",
        json!({"RegionID": 9, "RegionDescription": "Central"}),
    )
    .expect("insert");
    assert_ne!(
        store.snapshot().expect("snapshot"),
        seed::northwind().expect("seed")
    );

    api.reset_data_source().expect("reset");
    assert_eq!(
        store.snapshot().expect("snapshot"),
        seed::northwind().expect("seed")
    );
}

#[test]
fn orders_always_inline_their_details() {
    let (api, _, _) = build_api();

    let order = api
        .get("Orders", "10248", &QueryOptions::default())
        .expect("order readable");
    let details = order["Order_Details"]
        .as_array()
        .expect("details are inlined");
    assert_eq!(details.len(), 3);
    assert!(details.iter().all(|detail| detail["OrderID"] == 10248));

    let orders = api
        .query("CurrentOrders", &QueryOptions::default())
        .expect("view readable");
    assert!(orders
        .rows
        .iter()
        .all(|row| row["Order_Details"].is_array()));
}

#[test]
fn expand_inlines_requested_navigation_properties() {
    let (api, _, _) = build_api();
    let options = QueryOptions {
        expand: vec!["Customer".to_string()],
        ..QueryOptions::default()
    };

    let order = api.get("Orders", "10248", &options).expect("order readable");
    assert_eq!(order["Customer"]["CustomerID"], "VINET");
    assert!(order["Order_Details"].is_array());

    let foreign = api.get("Orders", "10308", &options).expect("order readable");
    assert!(
        foreign["Customer"].is_null(),
        "customers outside France stay hidden through navigation"
    );

    let err = api
        .get(
            "Orders",
            "10248",
            &QueryOptions {
                expand: vec!["Shipper".to_string()],
                ..QueryOptions::default()
            },
        )
        .expect_err("unknown navigation");
    assert!(matches!(err, ApiError::UnknownNavigation { .. }));
}

#[test]
fn navigate_follows_single_valued_properties() {
    let (api, _, _) = build_api();

    let supplier = api
        .navigate("Products", "59", "Supplier")
        .expect("supplier readable");
    assert_eq!(supplier["CompanyName"], "Gai pâturage");

    let product = api
        .navigate("Order_Details", "OrderID=11076,ProductID=14", "Product")
        .expect("navigation resolves");
    assert!(product.is_null(), "product 14 is not in the seed data");
}

#[test]
fn query_options_order_page_and_count() {
    let (api, _, _) = build_api();
    let options = QueryOptions {
        top: Some(3),
        order_by: Some(OrderBy {
            property: "UnitPrice".to_string(),
            descending: true,
        }),
        count: true,
        ..QueryOptions::default()
    };

    let collection = api.query("Products", &options).expect("query runs");
    assert_eq!(collection.count, Some(14));
    assert_eq!(ids(&collection.rows, "ProductID"), vec![38, 29, 9]);

    let err = api
        .query(
            "Products",
            &QueryOptions {
                order_by: Some(OrderBy {
                    property: "Colour".to_string(),
                    descending: false,
                }),
                ..QueryOptions::default()
            },
        )
        .expect_err("unknown property");
    assert!(matches!(err, ApiError::QueryOption(_)));
}

#[test]
fn page_size_is_capped_by_configuration() {
    let (api, _, _) = build_api_with(
        RecordingHook::default(),
        ApiConfig {
            max_page_size: 5,
            ..ApiConfig::default()
        },
    );
    let options = QueryOptions {
        top: Some(50),
        count: true,
        ..QueryOptions::default()
    };

    let collection = api.query("Products", &options).expect("query runs");
    assert_eq!(collection.rows.len(), 5);
    assert_eq!(collection.count, Some(14));
}

#[test]
fn merge_and_replace_updates() {
    let (api, store, _) = build_api();

    let merged = api
        .update("Products", "1", json!({"UnitPrice": 25}), UpdateMode::Merge)
        .expect("merge update");
    assert_eq!(merged["ProductName"], "Chai");
    assert_eq!(merged["UnitPrice"], 25.0);

    let replaced = api
        .update(
            "Products",
            "1",
            json!({"ProductID": 1, "ProductName": "Chai Latte"}),
            UpdateMode::Replace,
        )
        .expect("replace update");
    assert!(replaced["UnitPrice"].is_null());
    assert_eq!(
        stored_product(&store, 1).map(|row| row.product_name),
        Some("Chai Latte".to_string())
    );

    let mismatch = api
        .update(
            "Products",
            "1",
            json!({"ProductID": 2, "ProductName": "Chang"}),
            UpdateMode::Replace,
        )
        .expect_err("key mismatch");
    assert!(matches!(mismatch, ApiError::KeyMismatch { .. }));

    let invalid = api
        .update("Products", "1", json!({"UnitPrice": "cheap"}), UpdateMode::Merge)
        .expect_err("invalid payload");
    assert!(matches!(invalid, ApiError::InvalidPayload(_)));
}

#[test]
fn inserts_fire_hooks_and_reject_duplicates() {
    let (api, _, hooks) = build_api();

    let created = api
        .insert(
            "Products",
            json!({"ProductID": 100, "ProductName": "Pâté chinois", "UnitPrice": 24}),
        )
        .expect("insert");
    assert_eq!(created["ProductID"], 100);

    let actions: Vec<(&str, ChangeAction)> = hooks
        .calls()
        .iter()
        .map(|call| (call.stage, call.action))
        .collect();
    assert_eq!(
        actions,
        vec![
            ("changing", ChangeAction::Insert),
            ("changed", ChangeAction::Insert)
        ]
    );

    let duplicate = api
        .insert("Products", json!({"ProductID": 100, "ProductName": "Again"}))
        .expect_err("duplicate");
    assert!(matches!(duplicate, ApiError::Store(StoreError::Conflict)));
}

#[test]
fn unknown_names_and_bad_keys_are_reported() {
    let (api, _, _) = build_api();

    assert!(matches!(
        api.query("Shippers", &QueryOptions::default()),
        Err(ApiError::UnknownResource(name)) if name == "Shippers"
    ));
    assert!(matches!(
        api.get("Products", "'one'", &QueryOptions::default()),
        Err(ApiError::InvalidKey { .. })
    ));
    assert!(matches!(
        api.get("Customers", "BONAP", &QueryOptions::default()),
        Err(ApiError::InvalidKey { .. })
    ));
    assert!(matches!(
        api.get("Products", "SupplierID=1", &QueryOptions::default()),
        Err(ApiError::InvalidKey { .. })
    ));
    assert!(api
        .get("Products", "ProductID=1", &QueryOptions::default())
        .is_ok());
}

#[test]
fn metadata_lists_only_inspectable_names() {
    let model = ApiServices::northwind(ApiConfig::default())
        .build_model()
        .expect("model builds");
    let permissions = PermissionTable::new().grant(
        "Products",
        &[PermissionKind::Inspect, PermissionKind::Read],
    );
    let api = NorthwindApi::new(
        seeded_store(),
        Arc::new(NoopHook),
        Arc::new(permissions),
        model,
        ApiConfig::default(),
    );

    let metadata = api.metadata();
    let sets: Vec<&str> = metadata
        .entity_sets
        .iter()
        .map(|set| set.name.as_str())
        .collect();
    assert_eq!(sets, vec!["Products"]);
    assert!(metadata.operations.is_empty());
    assert!(metadata.entity_type("Product").is_some());
    assert!(metadata.entity_type("Order").is_none());

    assert!(api.source::<Product>().is_ok());
    assert!(matches!(
        api.source::<Customer>(),
        Err(ApiError::Unauthorized(_))
    ));
}

#[test]
fn full_metadata_publishes_every_northwind_name() {
    let (api, _, _) = build_api();
    let metadata = api.metadata();

    assert_eq!(metadata.entity_sets.len(), 9);
    assert_eq!(metadata.operations.len(), 3);
    let details = metadata
        .entity_type("Order")
        .and_then(|ty| ty.navigation_property("Order_Details"))
        .expect("navigation published");
    assert!(details.auto_expand());
}

#[test]
fn store_failures_surface_as_store_errors() {
    let model = ApiServices::northwind(ApiConfig::default())
        .build_model()
        .expect("model builds");
    let api = NorthwindApi::new(
        Arc::new(UnavailableStore),
        Arc::new(NoopHook),
        Arc::new(PermissionTable::northwind()),
        model,
        ApiConfig::default(),
    );

    assert!(matches!(
        api.query("Products", &QueryOptions::default()),
        Err(ApiError::Store(StoreError::Unavailable(_)))
    ));
    assert!(matches!(
        api.reset_data_source(),
        Err(ApiError::Store(StoreError::Unavailable(_)))
    ));
    assert!(matches!(
        UnavailableStore.source::<Product>(),
        Err(StoreError::Unavailable(_))
    ));
}
