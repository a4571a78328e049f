//! Northwind sample rows, embedded as CSV so the API can restore a known
//! state without external files.

use std::io::Read;

use super::domain::{Customer, Employee, Entity, Order, OrderDetail, Product, Region, Supplier};
use super::store::Tables;

const CUSTOMERS: &str = include_str!("../../data/customers.csv");
const PRODUCTS: &str = include_str!("../../data/products.csv");
const ORDERS: &str = include_str!("../../data/orders.csv");
const ORDER_DETAILS: &str = include_str!("../../data/order_details.csv");
const SUPPLIERS: &str = include_str!("../../data/suppliers.csv");
const EMPLOYEES: &str = include_str!("../../data/employees.csv");
const REGIONS: &str = include_str!("../../data/regions.csv");

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("invalid seed rows for {entity_set}: {source}")]
    Csv {
        entity_set: &'static str,
        #[source]
        source: csv::Error,
    },
}

/// Parses every embedded table.
pub fn northwind() -> Result<Tables, SeedError> {
    Ok(Tables::default()
        .with_rows(read_rows::<Customer, _>(CUSTOMERS.as_bytes())?)
        .with_rows(read_rows::<Product, _>(PRODUCTS.as_bytes())?)
        .with_rows(read_rows::<Order, _>(ORDERS.as_bytes())?)
        .with_rows(read_rows::<OrderDetail, _>(ORDER_DETAILS.as_bytes())?)
        .with_rows(read_rows::<Supplier, _>(SUPPLIERS.as_bytes())?)
        .with_rows(read_rows::<Employee, _>(EMPLOYEES.as_bytes())?)
        .with_rows(read_rows::<Region, _>(REGIONS.as_bytes())?))
}

/// Reads CSV rows for one entity type; headers carry the published property
/// names and empty cells become `None`.
pub fn read_rows<T, R>(reader: R) -> Result<Vec<T>, SeedError>
where
    T: Entity,
    R: Read,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    csv_reader
        .deserialize::<T>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| SeedError::Csv {
            entity_set: T::ENTITY_SET,
            source,
        })
}
