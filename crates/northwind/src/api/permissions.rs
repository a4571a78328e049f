use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

/// Kinds of access a grant can carry. `All` implies every other kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PermissionKind {
    Inspect,
    Read,
    Create,
    Update,
    Delete,
    Execute,
    All,
}

impl PermissionKind {
    pub fn label(self) -> &'static str {
        match self {
            PermissionKind::Inspect => "inspect",
            PermissionKind::Read => "read",
            PermissionKind::Create => "create",
            PermissionKind::Update => "update",
            PermissionKind::Delete => "delete",
            PermissionKind::Execute => "execute",
            PermissionKind::All => "all",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{permission} access to `{target}` is not granted")]
pub struct AuthorizationError {
    pub target: String,
    pub permission: PermissionKind,
}

/// Exact-match table from entity-set or operation name to granted kinds.
///
/// Lookups are fail-closed: a name without an entry is denied everything.
/// The table is built once and never mutated after it is shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionTable {
    grants: BTreeMap<String, BTreeSet<PermissionKind>>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `kinds` to the grant for `target`. Repeated grants accumulate.
    pub fn grant(mut self, target: &str, kinds: &[PermissionKind]) -> Self {
        self.grants
            .entry(target.to_string())
            .or_default()
            .extend(kinds.iter().copied());
        self
    }

    /// Grants published by the Northwind API.
    pub fn northwind() -> Self {
        use PermissionKind::{All, Execute, Inspect, Read};

        Self::new()
            .grant("Customers", &[All])
            .grant("Products", &[All])
            .grant("CurrentOrders", &[All])
            .grant("ExpensiveProducts", &[All])
            .grant("Orders", &[All])
            .grant("Employees", &[All])
            .grant("Regions", &[All])
            .grant("Suppliers", &[Inspect])
            .grant("Suppliers", &[Read])
            .grant("Order_Details", &[Inspect, Read])
            .grant("ResetDataSource", &[All])
            .grant("IncreasePrice", &[Inspect, Execute])
            .grant("MostExpensive", &[Inspect, Execute])
    }

    pub fn grants(&self, target: &str) -> Option<&BTreeSet<PermissionKind>> {
        self.grants.get(target)
    }

    pub fn allows(&self, target: &str, permission: PermissionKind) -> bool {
        self.grants(target).map_or(false, |kinds| {
            kinds.contains(&PermissionKind::All) || kinds.contains(&permission)
        })
    }

    pub fn authorize(
        &self,
        target: &str,
        permission: PermissionKind,
    ) -> Result<(), AuthorizationError> {
        if self.allows(target, permission) {
            Ok(())
        } else {
            Err(AuthorizationError {
                target: target.to_string(),
                permission,
            })
        }
    }
}
