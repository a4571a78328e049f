use std::fmt;
use std::sync::Arc;

use chrono::Local;
use tracing::{info, warn};

use super::domain::EntityRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeAction::Insert => "insert",
            ChangeAction::Update => "update",
            ChangeAction::Delete => "delete",
        })
    }
}

/// Error raised inside a hook. Logged and dropped; never aborts a change.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error(transparent)]
    ChangeLog(#[from] ChangeLogError),
    #[error("hook failed: {0}")]
    Other(String),
}

/// Observer invoked around each persisted change. Hooks see the record but
/// cannot alter it.
pub trait SubmitHook: Send + Sync {
    fn on_changing(&self, _action: ChangeAction, _entity: EntityRef<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn on_changed(&self, _action: ChangeAction, _entity: EntityRef<'_>) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hook that observes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl SubmitHook for NoopHook {}

/// Side-channel sink the product hook writes to.
pub trait ChangeLog: Send + Sync {
    fn write(&self, line: String) -> Result<(), ChangeLogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChangeLogError {
    #[error("change log unavailable: {0}")]
    Unavailable(String),
}

/// Change log that forwards lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingChangeLog;

impl ChangeLog for TracingChangeLog {
    fn write(&self, line: String) -> Result<(), ChangeLogError> {
        info!(target: "northwind::changes", "{line}");
        Ok(())
    }
}

/// Logs product updates before they persist and product inserts after.
pub struct ProductChangeLogger<L> {
    log: Arc<L>,
}

impl<L: ChangeLog> ProductChangeLogger<L> {
    pub fn new(log: Arc<L>) -> Self {
        Self { log }
    }

    fn write(&self, product_id: i32, message: &str) -> Result<(), HookError> {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.log.write(format!("{stamp} {product_id} {message}"))?;
        Ok(())
    }
}

impl<L: ChangeLog> SubmitHook for ProductChangeLogger<L> {
    fn on_changing(&self, action: ChangeAction, entity: EntityRef<'_>) -> Result<(), HookError> {
        match (action, entity) {
            (ChangeAction::Update, EntityRef::Product(product)) => {
                self.write(product.product_id, "is being updated")
            }
            _ => Ok(()),
        }
    }

    fn on_changed(&self, action: ChangeAction, entity: EntityRef<'_>) -> Result<(), HookError> {
        match (action, entity) {
            (ChangeAction::Insert, EntityRef::Product(product)) => {
                self.write(product.product_id, "has been inserted")
            }
            _ => Ok(()),
        }
    }
}

/// Runs a hook result through the best-effort policy.
pub(crate) fn observe(
    stage: &'static str,
    action: ChangeAction,
    entity: EntityRef<'_>,
    result: Result<(), HookError>,
) {
    if let Err(error) = result {
        warn!(
            stage,
            %action,
            entity_set = entity.entity_set(),
            %error,
            "submission hook failed; change proceeds"
        );
    }
}
