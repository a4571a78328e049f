use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::store::Tables;
use crate::model::{EntityType, PropertyKind};

/// Contract every published record type satisfies.
///
/// The associated constants carry the names the HTTP surface and the
/// permission table use; `rows`/`rows_mut` give the in-memory store a
/// statically dispatched way to reach the table for a type.
pub trait Entity:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Key: Ord + Clone + fmt::Debug + Send + Sync + 'static;

    const TYPE_NAME: &'static str;
    const ENTITY_SET: &'static str;

    fn key(&self) -> Self::Key;

    /// Parses the text between the parentheses of `Set(<key>)`.
    fn parse_key(raw: &str) -> Option<Self::Key>;

    fn entity_type() -> EntityType;

    fn as_entity_ref(&self) -> EntityRef<'_>;

    fn rows(tables: &Tables) -> &BTreeMap<Self::Key, Self>;

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<Self::Key, Self>;
}

/// Borrowed view of any entity, handed to submission hooks.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Customer(&'a Customer),
    Product(&'a Product),
    Order(&'a Order),
    OrderDetail(&'a OrderDetail),
    Supplier(&'a Supplier),
    Employee(&'a Employee),
    Region(&'a Region),
}

impl EntityRef<'_> {
    pub fn entity_set(&self) -> &'static str {
        match self {
            EntityRef::Customer(_) => Customer::ENTITY_SET,
            EntityRef::Product(_) => Product::ENTITY_SET,
            EntityRef::Order(_) => Order::ENTITY_SET,
            EntityRef::OrderDetail(_) => OrderDetail::ENTITY_SET,
            EntityRef::Supplier(_) => Supplier::ENTITY_SET,
            EntityRef::Employee(_) => Employee::ENTITY_SET,
            EntityRef::Region(_) => Region::ENTITY_SET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    #[serde(rename = "CustomerID")]
    pub customer_id: String,
    #[serde(rename = "CompanyName")]
    pub company_name: String,
    #[serde(rename = "ContactName", default)]
    pub contact_name: Option<String>,
    #[serde(rename = "City", default)]
    pub city: Option<String>,
    #[serde(rename = "CountryRegion", default)]
    pub country_region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ProductID")]
    pub product_id: i32,
    #[serde(rename = "ProductName")]
    pub product_name: String,
    #[serde(rename = "SupplierID", default)]
    pub supplier_id: Option<i32>,
    #[serde(rename = "UnitPrice", default)]
    pub unit_price: Option<f64>,
    #[serde(rename = "UnitsInStock", default)]
    pub units_in_stock: Option<i16>,
    #[serde(rename = "Discontinued", default)]
    pub discontinued: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "OrderID")]
    pub order_id: i32,
    #[serde(rename = "CustomerID", default)]
    pub customer_id: Option<String>,
    #[serde(rename = "EmployeeID", default)]
    pub employee_id: Option<i32>,
    #[serde(rename = "OrderDate", default)]
    pub order_date: Option<NaiveDate>,
    #[serde(rename = "ShippedDate", default)]
    pub shipped_date: Option<NaiveDate>,
    #[serde(rename = "ShipCountry", default)]
    pub ship_country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(rename = "OrderID")]
    pub order_id: i32,
    #[serde(rename = "ProductID")]
    pub product_id: i32,
    #[serde(rename = "UnitPrice")]
    pub unit_price: f64,
    #[serde(rename = "Quantity")]
    pub quantity: i16,
    #[serde(rename = "Discount", default)]
    pub discount: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    #[serde(rename = "SupplierID")]
    pub supplier_id: i32,
    #[serde(rename = "CompanyName")]
    pub company_name: String,
    #[serde(rename = "City", default)]
    pub city: Option<String>,
    #[serde(rename = "Country", default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    #[serde(rename = "EmployeeID")]
    pub employee_id: i32,
    #[serde(rename = "LastName")]
    pub last_name: String,
    #[serde(rename = "FirstName")]
    pub first_name: String,
    #[serde(rename = "Title", default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    #[serde(rename = "RegionID")]
    pub region_id: i32,
    #[serde(rename = "RegionDescription")]
    pub region_description: String,
}

/// Strips an optional `<property>=` prefix; any other property name is rejected.
fn key_value<'a>(raw: &'a str, property: &str) -> Option<&'a str> {
    let raw = raw.trim();
    match raw.split_once('=') {
        Some((name, value)) if name.trim() == property => Some(value.trim()),
        Some(_) => None,
        None => Some(raw),
    }
}

fn parse_int_key(raw: &str, property: &str) -> Option<i32> {
    key_value(raw, property)?.parse().ok()
}

fn parse_string_key(raw: &str, property: &str) -> Option<String> {
    let raw = key_value(raw, property)?;
    let unquoted = raw.strip_prefix('\'')?.strip_suffix('\'')?;
    if unquoted.is_empty() {
        return None;
    }
    Some(unquoted.replace("''", "'"))
}

impl Entity for Customer {
    type Key = String;

    const TYPE_NAME: &'static str = "Customer";
    const ENTITY_SET: &'static str = "Customers";

    fn key(&self) -> String {
        self.customer_id.clone()
    }

    fn parse_key(raw: &str) -> Option<String> {
        parse_string_key(raw, "CustomerID")
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::TYPE_NAME, &["CustomerID"])
            .property("CustomerID", PropertyKind::String, false)
            .property("CompanyName", PropertyKind::String, false)
            .property("ContactName", PropertyKind::String, true)
            .property("City", PropertyKind::String, true)
            .property("CountryRegion", PropertyKind::String, true)
    }

    fn as_entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Customer(self)
    }

    fn rows(tables: &Tables) -> &BTreeMap<String, Self> {
        &tables.customers
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<String, Self> {
        &mut tables.customers
    }
}

impl Entity for Product {
    type Key = i32;

    const TYPE_NAME: &'static str = "Product";
    const ENTITY_SET: &'static str = "Products";

    fn key(&self) -> i32 {
        self.product_id
    }

    fn parse_key(raw: &str) -> Option<i32> {
        parse_int_key(raw, "ProductID")
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::TYPE_NAME, &["ProductID"])
            .property("ProductID", PropertyKind::Int32, false)
            .property("ProductName", PropertyKind::String, false)
            .property("SupplierID", PropertyKind::Int32, true)
            .property("UnitPrice", PropertyKind::Decimal, true)
            .property("UnitsInStock", PropertyKind::Int16, true)
            .property("Discontinued", PropertyKind::Boolean, false)
            .navigation("Supplier", Supplier::TYPE_NAME, false)
    }

    fn as_entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Product(self)
    }

    fn rows(tables: &Tables) -> &BTreeMap<i32, Self> {
        &tables.products
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<i32, Self> {
        &mut tables.products
    }
}

impl Entity for Order {
    type Key = i32;

    const TYPE_NAME: &'static str = "Order";
    const ENTITY_SET: &'static str = "Orders";

    fn key(&self) -> i32 {
        self.order_id
    }

    fn parse_key(raw: &str) -> Option<i32> {
        parse_int_key(raw, "OrderID")
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::TYPE_NAME, &["OrderID"])
            .property("OrderID", PropertyKind::Int32, false)
            .property("CustomerID", PropertyKind::String, true)
            .property("EmployeeID", PropertyKind::Int32, true)
            .property("OrderDate", PropertyKind::Date, true)
            .property("ShippedDate", PropertyKind::Date, true)
            .property("ShipCountry", PropertyKind::String, true)
            .navigation("Customer", Customer::TYPE_NAME, false)
            .navigation("Order_Details", OrderDetail::TYPE_NAME, true)
    }

    fn as_entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Order(self)
    }

    fn rows(tables: &Tables) -> &BTreeMap<i32, Self> {
        &tables.orders
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<i32, Self> {
        &mut tables.orders
    }
}

impl Entity for OrderDetail {
    type Key = (i32, i32);

    const TYPE_NAME: &'static str = "Order_Detail";
    const ENTITY_SET: &'static str = "Order_Details";

    fn key(&self) -> (i32, i32) {
        (self.order_id, self.product_id)
    }

    /// Accepts `OrderID=10248,ProductID=11` in either order.
    fn parse_key(raw: &str) -> Option<(i32, i32)> {
        let mut order_id = None;
        let mut product_id = None;
        for part in raw.split(',') {
            let (name, value) = part.split_once('=')?;
            let value = value.trim().parse().ok()?;
            match name.trim() {
                "OrderID" => order_id = Some(value),
                "ProductID" => product_id = Some(value),
                _ => return None,
            }
        }
        Some((order_id?, product_id?))
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::TYPE_NAME, &["OrderID", "ProductID"])
            .property("OrderID", PropertyKind::Int32, false)
            .property("ProductID", PropertyKind::Int32, false)
            .property("UnitPrice", PropertyKind::Decimal, false)
            .property("Quantity", PropertyKind::Int16, false)
            .property("Discount", PropertyKind::Single, false)
            .navigation("Product", Product::TYPE_NAME, false)
    }

    fn as_entity_ref(&self) -> EntityRef<'_> {
        EntityRef::OrderDetail(self)
    }

    fn rows(tables: &Tables) -> &BTreeMap<(i32, i32), Self> {
        &tables.order_details
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<(i32, i32), Self> {
        &mut tables.order_details
    }
}

impl Entity for Supplier {
    type Key = i32;

    const TYPE_NAME: &'static str = "Supplier";
    const ENTITY_SET: &'static str = "Suppliers";

    fn key(&self) -> i32 {
        self.supplier_id
    }

    fn parse_key(raw: &str) -> Option<i32> {
        parse_int_key(raw, "SupplierID")
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::TYPE_NAME, &["SupplierID"])
            .property("SupplierID", PropertyKind::Int32, false)
            .property("CompanyName", PropertyKind::String, false)
            .property("City", PropertyKind::String, true)
            .property("Country", PropertyKind::String, true)
    }

    fn as_entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Supplier(self)
    }

    fn rows(tables: &Tables) -> &BTreeMap<i32, Self> {
        &tables.suppliers
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<i32, Self> {
        &mut tables.suppliers
    }
}

impl Entity for Employee {
    type Key = i32;

    const TYPE_NAME: &'static str = "Employee";
    const ENTITY_SET: &'static str = "Employees";

    fn key(&self) -> i32 {
        self.employee_id
    }

    fn parse_key(raw: &str) -> Option<i32> {
        parse_int_key(raw, "EmployeeID")
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::TYPE_NAME, &["EmployeeID"])
            .property("EmployeeID", PropertyKind::Int32, false)
            .property("LastName", PropertyKind::String, false)
            .property("FirstName", PropertyKind::String, false)
            .property("Title", PropertyKind::String, true)
    }

    fn as_entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Employee(self)
    }

    fn rows(tables: &Tables) -> &BTreeMap<i32, Self> {
        &tables.employees
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<i32, Self> {
        &mut tables.employees
    }
}

impl Entity for Region {
    type Key = i32;

    const TYPE_NAME: &'static str = "Region";
    const ENTITY_SET: &'static str = "Regions";

    fn key(&self) -> i32 {
        self.region_id
    }

    fn parse_key(raw: &str) -> Option<i32> {
        parse_int_key(raw, "RegionID")
    }

    fn entity_type() -> EntityType {
        EntityType::new(Self::TYPE_NAME, &["RegionID"])
            .property("RegionID", PropertyKind::Int32, false)
            .property("RegionDescription", PropertyKind::String, false)
    }

    fn as_entity_ref(&self) -> EntityRef<'_> {
        EntityRef::Region(self)
    }

    fn rows(tables: &Tables) -> &BTreeMap<i32, Self> {
        &tables.regions
    }

    fn rows_mut(tables: &mut Tables) -> &mut BTreeMap<i32, Self> {
        &mut tables.regions
    }
}
