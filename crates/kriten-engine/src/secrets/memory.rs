//! In-memory secret store for tests and local development.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::SecretStore;
use crate::catalog::{Record, WriteOp};
use crate::error::{Error, Result};

const RESOURCE: &str = "secret";

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::infrastructure("secret store lock poisoned")
}

/// In-memory [`SecretStore`] that counts writes.
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<String, Record>>,
    writes: AtomicUsize,
}

impl InMemorySecretStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of successful puts and deletes so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns true if a secret named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.secrets
            .read()
            .map(|s| s.contains_key(name))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<Record>> {
        let secrets = self.secrets.read().map_err(poison_err)?;
        Ok(secrets.get(name).cloned())
    }

    async fn put(&self, name: &str, data: Record, op: WriteOp) -> Result<()> {
        let mut secrets = self.secrets.write().map_err(poison_err)?;
        match (op, secrets.contains_key(name)) {
            (WriteOp::Create, true) => return Err(Error::conflict(RESOURCE, name)),
            (WriteOp::Update, false) => return Err(Error::not_found(RESOURCE, name)),
            _ => {}
        }
        secrets.insert(name.to_string(), data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let mut secrets = self.secrets.write().map_err(poison_err)?;
        if secrets.remove(name).is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
