//! Imperative views and entity-set filters. Every predicate here is pure and
//! is evaluated per request against live rows.

use super::domain::{Customer, Employee, Entity, Order, OrderDetail, Product, Region, Supplier};
use super::query::Query;
use crate::model::EntitySet;

/// Products strictly above this unit price are "expensive".
pub const EXPENSIVE_PRICE_THRESHOLD: f64 = 50.0;

/// Customers outside this region are filtered out of every read.
pub const VISIBLE_CUSTOMER_REGION: &str = "France";

/// Named, read-only derived queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    ExpensiveProducts,
    CurrentOrders,
}

impl View {
    pub const ALL: [View; 2] = [View::ExpensiveProducts, View::CurrentOrders];

    pub fn name(self) -> &'static str {
        match self {
            View::ExpensiveProducts => "ExpensiveProducts",
            View::CurrentOrders => "CurrentOrders",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|view| view.name() == name)
    }

    /// Entity set the view draws its rows from.
    pub fn source_set(self) -> &'static str {
        match self {
            View::ExpensiveProducts => Product::ENTITY_SET,
            View::CurrentOrders => Order::ENTITY_SET,
        }
    }

    pub fn entity_type(self) -> &'static str {
        match self {
            View::ExpensiveProducts => Product::TYPE_NAME,
            View::CurrentOrders => Order::TYPE_NAME,
        }
    }

    pub fn entity_set(self) -> EntitySet {
        EntitySet {
            name: self.name().to_string(),
            entity_type: self.entity_type().to_string(),
        }
    }
}

pub fn is_expensive(product: &Product) -> bool {
    product
        .unit_price
        .map_or(false, |price| price > EXPENSIVE_PRICE_THRESHOLD)
}

pub fn is_current(order: &Order) -> bool {
    order.shipped_date.is_none()
}

pub fn is_visible_customer(customer: &Customer) -> bool {
    customer.country_region.as_deref() == Some(VISIBLE_CUSTOMER_REGION)
}

pub fn expensive_products(products: Query<Product>) -> Query<Product> {
    products.filter(is_expensive)
}

pub fn current_orders(orders: Query<Order>) -> Query<Order> {
    orders.filter(is_current)
}

/// Entity-set level filter applied before any other query shaping.
/// Types without a filter pass through untouched.
pub trait EntitySetFilter: Entity {
    fn visible(&self) -> bool {
        true
    }
}

impl EntitySetFilter for Customer {
    fn visible(&self) -> bool {
        is_visible_customer(self)
    }
}

impl EntitySetFilter for Product {}
impl EntitySetFilter for Order {}
impl EntitySetFilter for OrderDetail {}
impl EntitySetFilter for Supplier {}
impl EntitySetFilter for Employee {}
impl EntitySetFilter for Region {}
