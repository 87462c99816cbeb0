//! In-memory catalog store for tests and local development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{ConfigStore, Record, WriteOp};
use crate::error::{Error, Result};

/// Resource type reported in catalog errors.
const RESOURCE: &str = "config";

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::infrastructure("catalog store lock poisoned")
}

/// In-memory [`ConfigStore`].
///
/// ## Example
///
/// ```rust
/// use kriten_engine::catalog::memory::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// assert_eq!(store.len(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    records: RwLock<BTreeMap<String, Record>>,
    writes: AtomicUsize,
}

impl InMemoryConfigStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns the number of successful puts so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, name: &str) -> Result<Option<Record>> {
        let records = self.records.read().map_err(poison_err)?;
        Ok(records.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<(String, Record)>> {
        let records = self.records.read().map_err(poison_err)?;
        Ok(records
            .iter()
            .map(|(name, data)| (name.clone(), data.clone()))
            .collect())
    }

    async fn put(&self, name: &str, data: Record, op: WriteOp) -> Result<Record> {
        let mut records = self.records.write().map_err(poison_err)?;
        match (op, records.contains_key(name)) {
            (WriteOp::Create, true) => return Err(Error::conflict(RESOURCE, name)),
            (WriteOp::Update, false) => return Err(Error::not_found(RESOURCE, name)),
            _ => {}
        }
        records.insert(name.to_string(), data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(data)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut records = self.records.write().map_err(poison_err)?;
        records
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found(RESOURCE, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn create_then_conflict() -> Result<()> {
        let store = InMemoryConfigStore::new();
        store
            .put("python", record(&[("image", "python:3")]), WriteOp::Create)
            .await?;
        let err = store
            .put("python", record(&[("image", "python:3")]), WriteOp::Create)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        Ok(())
    }

    #[tokio::test]
    async fn update_requires_existing() {
        let store = InMemoryConfigStore::new();
        let err = store
            .put("ghost", Record::new(), WriteOp::Update)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn list_is_ordered_and_delete_removes() -> Result<()> {
        let store = InMemoryConfigStore::new();
        store.put("b", Record::new(), WriteOp::Create).await?;
        store.put("a", Record::new(), WriteOp::Create).await?;
        let names: Vec<_> = store.list().await?.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);

        store.delete("a").await?;
        assert!(store.get("a").await?.is_none());
        assert!(store.delete("a").await.unwrap_err().is_not_found());
        Ok(())
    }
}
