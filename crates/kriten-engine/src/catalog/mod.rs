//! Flat key/value catalog records for runners and tasks.
//!
//! Runners and tasks share one store keyed by name. A record is a runner when
//! it has a non-empty `image` and a task when it has a non-empty `runner`.
//! Typed conversions live next to the [`Runner`](crate::runner::Runner) and
//! [`Task`](crate::task::Task) types; this module only moves string maps.

pub mod kube;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

/// A flat string map as persisted by the catalog and secret stores.
pub type Record = BTreeMap<String, String>;

/// Whether a write creates a new object or replaces an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Fails with a conflict if the object exists.
    Create,
    /// Fails with not-found if the object does not exist.
    Update,
}

impl std::fmt::Display for WriteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
        })
    }
}

/// Storage for catalog records.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the record named `name`, or `None` if absent.
    async fn get(&self, name: &str) -> Result<Option<Record>>;

    /// Returns every record as `(name, data)` pairs, ordered by name.
    async fn list(&self) -> Result<Vec<(String, Record)>>;

    /// Creates or replaces the record named `name`.
    ///
    /// # Errors
    ///
    /// [`WriteOp::Create`] on an existing name yields a conflict error;
    /// [`WriteOp::Update`] on a missing name yields a not-found error.
    async fn put(&self, name: &str, data: Record, op: WriteOp) -> Result<Record>;

    /// Deletes the record named `name`.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the record does not exist.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// Returns a non-empty value for `key`.
pub(crate) fn non_empty<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}
