use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::domain::{Customer, Employee, Entity, Order, OrderDetail, Product, Region, Supplier};

/// Backing rows for every published entity set, keyed by entity key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub customers: BTreeMap<String, Customer>,
    pub products: BTreeMap<i32, Product>,
    pub orders: BTreeMap<i32, Order>,
    pub order_details: BTreeMap<(i32, i32), OrderDetail>,
    pub suppliers: BTreeMap<i32, Supplier>,
    pub employees: BTreeMap<i32, Employee>,
    pub regions: BTreeMap<i32, Region>,
}

impl Tables {
    pub fn with_rows<T: Entity>(mut self, rows: impl IntoIterator<Item = T>) -> Self {
        let table = T::rows_mut(&mut self);
        for row in rows {
            table.insert(row.key(), row);
        }
        self
    }
}

/// Storage abstraction the API facade queries and mutates.
pub trait EntityStore: Send + Sync {
    /// Snapshot of every row of `T`'s entity set.
    fn source<T: Entity>(&self) -> Result<Vec<T>, StoreError>;
    fn find<T: Entity>(&self, key: &T::Key) -> Result<Option<T>, StoreError>;
    fn insert<T: Entity>(&self, row: T) -> Result<T, StoreError>;
    fn update<T: Entity>(&self, row: T) -> Result<(), StoreError>;
    fn delete<T: Entity>(&self, key: &T::Key) -> Result<(), StoreError>;
    /// Replaces every table with `tables`.
    fn reset(&self, tables: Tables) -> Result<(), StoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub fn snapshot(&self) -> Result<Tables, StoreError> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))
    }
}

impl EntityStore for InMemoryStore {
    fn source<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        let guard = self.read()?;
        Ok(T::rows(&guard).values().cloned().collect())
    }

    fn find<T: Entity>(&self, key: &T::Key) -> Result<Option<T>, StoreError> {
        let guard = self.read()?;
        Ok(T::rows(&guard).get(key).cloned())
    }

    fn insert<T: Entity>(&self, row: T) -> Result<T, StoreError> {
        let mut guard = self.write()?;
        let table = T::rows_mut(&mut guard);
        let key = row.key();
        if table.contains_key(&key) {
            return Err(StoreError::Conflict);
        }
        table.insert(key, row.clone());
        Ok(row)
    }

    fn update<T: Entity>(&self, row: T) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        let table = T::rows_mut(&mut guard);
        match table.get_mut(&row.key()) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn delete<T: Entity>(&self, key: &T::Key) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        T::rows_mut(&mut guard)
            .remove(key)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn reset(&self, tables: Tables) -> Result<(), StoreError> {
        *self.write()? = tables;
        Ok(())
    }
}
