//! Write-only secret records with diff-merge updates.
//!
//! Secrets share the name of the runner or task they belong to. Reads never
//! return stored values: every value is replaced by [`REDACTED`]. Updates are
//! expressed as a desired map where, per key:
//!
//! - [`REDACTED`] keeps the stored value,
//! - an empty string removes the key,
//! - anything else sets the key.
//!
//! Keys absent from the desired map are left untouched. When the merge leaves
//! nothing, the secret object itself is deleted.

pub mod kube;
pub mod memory;

use async_trait::async_trait;

use crate::catalog::{Record, WriteOp};
use crate::error::Result;

/// Sentinel shown in place of every stored secret value.
pub const REDACTED: &str = "************";

/// Storage for secret records.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns the stored secret, or `None` if absent.
    async fn get(&self, name: &str) -> Result<Option<Record>>;

    /// Creates or replaces a secret.
    async fn put(&self, name: &str, data: Record, op: WriteOp) -> Result<()>;

    /// Deletes a secret. Deleting an absent secret succeeds.
    async fn delete(&self, name: &str) -> Result<()>;
}

/// What [`apply_update`] did to the stored secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretOutcome {
    /// The merge produced the stored contents; nothing was written.
    Unchanged,
    /// A new secret was created.
    Created,
    /// The existing secret was replaced.
    Updated,
    /// The merge left no keys and the secret was removed.
    Deleted,
}

/// Applies the diff-merge rules of `desired` to `current`.
#[must_use]
pub fn merge(current: &Record, desired: &Record) -> Record {
    let mut merged = current.clone();
    for (key, value) in desired {
        match value.as_str() {
            REDACTED => {}
            "" => {
                merged.remove(key);
            }
            _ => {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Returns `secret` with every value replaced by [`REDACTED`].
#[must_use]
pub fn redact(secret: &Record) -> Record {
    secret
        .keys()
        .map(|key| (key.clone(), REDACTED.to_string()))
        .collect()
}

/// Fetches, merges and writes back the secret `name`.
///
/// # Errors
///
/// Propagates store failures. The read-modify-write is not transactional.
pub async fn apply_update(
    store: &dyn SecretStore,
    name: &str,
    desired: &Record,
) -> Result<SecretOutcome> {
    let current = store.get(name).await?;
    let merged = merge(current.as_ref().unwrap_or(&Record::new()), desired);

    let outcome = match current {
        Some(existing) if existing == merged => SecretOutcome::Unchanged,
        Some(_) if merged.is_empty() => {
            store.delete(name).await?;
            SecretOutcome::Deleted
        }
        Some(_) => {
            store.put(name, merged, WriteOp::Update).await?;
            SecretOutcome::Updated
        }
        None if merged.is_empty() => SecretOutcome::Unchanged,
        None => {
            store.put(name, merged, WriteOp::Create).await?;
            SecretOutcome::Created
        }
    };

    tracing::debug!(secret = name, outcome = ?outcome, "applied secret update");
    Ok(outcome)
}

/// Returns the redacted secret `name`, or `None` if absent.
///
/// # Errors
///
/// Propagates store failures.
pub async fn get_redacted(store: &dyn SecretStore, name: &str) -> Result<Option<Record>> {
    Ok(store.get(name).await?.as_ref().map(redact))
}

#[cfg(test)]
mod tests {
    use super::memory::InMemorySecretStore;
    use super::*;
    use proptest::prelude::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn merge_applies_three_rules() {
        let current = record(&[("keep", "1"), ("drop", "2"), ("change", "3"), ("other", "4")]);
        let desired = record(&[("keep", REDACTED), ("drop", ""), ("change", "new"), ("add", "5")]);
        let merged = merge(&current, &desired);
        assert_eq!(
            merged,
            record(&[("add", "5"), ("change", "new"), ("keep", "1"), ("other", "4")])
        );
    }

    #[test]
    fn sentinel_for_missing_key_adds_nothing() {
        let merged = merge(&Record::new(), &record(&[("ghost", REDACTED)]));
        assert!(merged.is_empty());
    }

    #[test]
    fn redact_hides_every_value() {
        let redacted = redact(&record(&[("a", "x"), ("b", "")]));
        assert!(redacted.values().all(|v| v == REDACTED));
        assert_eq!(redacted.len(), 2);
    }

    #[tokio::test]
    async fn emptying_every_key_deletes_the_secret() -> Result<()> {
        let store = InMemorySecretStore::new();
        store.put("t", record(&[("a", "1"), ("b", "2")]), WriteOp::Create).await?;

        let outcome = apply_update(&store, "t", &record(&[("a", ""), ("b", "")])).await?;
        assert_eq!(outcome, SecretOutcome::Deleted);
        assert!(store.get("t").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn first_write_creates() -> Result<()> {
        let store = InMemorySecretStore::new();
        let outcome = apply_update(&store, "t", &record(&[("a", "1")])).await?;
        assert_eq!(outcome, SecretOutcome::Created);
        assert_eq!(get_redacted(&store, "t").await?, Some(record(&[("a", REDACTED)])));
        Ok(())
    }

    #[tokio::test]
    async fn empty_update_of_absent_secret_is_noop() -> Result<()> {
        let store = InMemorySecretStore::new();
        let outcome = apply_update(&store, "t", &record(&[("a", "")])).await?;
        assert_eq!(outcome, SecretOutcome::Unchanged);
        assert_eq!(store.writes(), 0);
        Ok(())
    }

    proptest! {
        #[test]
        fn sentinel_only_update_is_identity(
            current in prop::collection::btree_map("[a-z]{1,8}", "[ -~]{1,16}", 1..6)
        ) {
            let store = InMemorySecretStore::new();
            tokio_test::block_on(async {
                store.put("s", current.clone(), WriteOp::Create).await?;
                let writes_before = store.writes();
                let desired = redact(&current);
                let outcome = apply_update(&store, "s", &desired).await?;
                assert_eq!(outcome, SecretOutcome::Unchanged);
                assert_eq!(store.writes(), writes_before);
                assert_eq!(store.get("s").await?, Some(current.clone()));
                Ok::<_, crate::error::Error>(())
            }).map_err(|e| TestCaseError::fail(e.to_string()))?;
        }
    }
}
