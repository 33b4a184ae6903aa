//! Guarded read-modify-write over single logical keys.
//!
//! A per-key async mutex serializes writers within this instance. Writers on
//! other instances are detected by re-reading the revision token immediately
//! before the write; the adapter has no compare-and-swap, so this narrows
//! the lost-update window rather than eliminating it.

use crate::config::StoreConfig;
use crate::document_store::DocumentStore;
use crate::envelope::{stored_revision, Envelope};
use reqbase_core::{ReqbaseResult, StorageError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Outcome of a mutation closure.
pub(crate) struct Mutation<R> {
    pub value: R,
    pub dirty: bool,
}

impl<R> Mutation<R> {
    /// The closure changed the container; persist it.
    pub fn write(value: R) -> Self {
        Self { value, dirty: true }
    }

    /// Nothing changed; skip the write entirely.
    pub fn skip(value: R) -> Self {
        Self {
            value,
            dirty: false,
        }
    }
}

/// Registry of per-key write locks.
#[derive(Default)]
pub(crate) struct KeyLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_key(&self, key: &str) -> ReqbaseResult<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(Arc::clone(
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        ))
    }
}

/// Adapter read with a bounded timeout.
pub(crate) async fn fetch(
    store: &dyn DocumentStore,
    key: &str,
    limit: Duration,
) -> ReqbaseResult<Option<Value>> {
    match tokio::time::timeout(limit, store.get(key)).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error(key, limit)),
    }
}

/// Adapter write with a bounded timeout.
pub(crate) async fn put(
    store: &dyn DocumentStore,
    key: &str,
    value: Value,
    limit: Duration,
) -> ReqbaseResult<()> {
    match tokio::time::timeout(limit, store.set(key, value)).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error(key, limit)),
    }
}

/// Adapter delete with a bounded timeout.
pub(crate) async fn remove(
    store: &dyn DocumentStore,
    key: &str,
    limit: Duration,
) -> ReqbaseResult<()> {
    match tokio::time::timeout(limit, store.delete(key)).await {
        Ok(result) => result,
        Err(_) => Err(timeout_error(key, limit)),
    }
}

fn timeout_error(key: &str, limit: Duration) -> reqbase_core::ReqbaseError {
    StorageError::Timeout {
        key: key.to_string(),
        waited_ms: limit.as_millis() as u64,
    }
    .into()
}

/// Run a guarded read-modify-write against one logical key.
///
/// The closure may run more than once: each conflict retry re-reads the
/// container and re-applies it from scratch. Errors returned by the closure
/// abort the mutation with nothing written.
pub(crate) async fn mutate<T, R, F>(
    store: &dyn DocumentStore,
    locks: &KeyLocks,
    config: &StoreConfig,
    key: &str,
    mut apply: F,
) -> ReqbaseResult<R>
where
    T: Serialize + DeserializeOwned + Default,
    F: FnMut(&mut T) -> ReqbaseResult<Mutation<R>>,
{
    let lock = locks.for_key(key)?;
    let _guard = lock.lock().await;

    let mut expected = 0;
    for _ in 0..config.write_attempts {
        let envelope: Envelope<T> = Envelope::decode(key, fetch(store, key, config.op_timeout).await?)?;
        expected = envelope.revision;
        let mut value = envelope.value;
        let outcome = apply(&mut value)?;
        if !outcome.dirty {
            return Ok(outcome.value);
        }

        // No CAS in the adapter: re-read the token just before writing to
        // catch writers on other instances.
        let current = stored_revision(&fetch(store, key, config.op_timeout).await?);
        if current != envelope.revision {
            tracing::debug!(key, expected = envelope.revision, observed = current, "write conflict, retrying");
            continue;
        }

        let next = Envelope {
            revision: envelope.revision + 1,
            value,
        };
        put(store, key, next.encode(key)?, config.op_timeout).await?;
        return Ok(outcome.value);
    }

    Err(StorageError::WriteConflict {
        key: key.to_string(),
        expected,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::MemoryDocumentStore;
    use async_trait::async_trait;
    use serde_json::json;

    #[tokio::test]
    async fn test_mutate_bumps_revision() {
        let store = MemoryDocumentStore::new();
        let locks = KeyLocks::new();
        let config = StoreConfig::default();

        for _ in 0..3 {
            mutate::<Vec<String>, _, _>(&store, &locks, &config, "user-types", |items| {
                items.push("x".to_string());
                Ok(Mutation::write(()))
            })
            .await
            .unwrap();
        }

        let stored = store.get("user-types").await.unwrap();
        assert_eq!(stored_revision(&stored), 3);
        let envelope: Envelope<Vec<String>> = Envelope::decode("user-types", stored).unwrap();
        assert_eq!(envelope.value.len(), 3);
    }

    #[tokio::test]
    async fn test_skip_leaves_storage_untouched() {
        let store = MemoryDocumentStore::new();
        let locks = KeyLocks::new();
        let config = StoreConfig::default();

        let seen = mutate::<Vec<String>, _, _>(&store, &locks, &config, "user-types", |items| {
            Ok(Mutation::skip(items.len()))
        })
        .await
        .unwrap();

        assert_eq!(seen, 0);
        assert_eq!(store.get("user-types").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closure_error_aborts_without_write() {
        let store = MemoryDocumentStore::new();
        let locks = KeyLocks::new();
        let config = StoreConfig::default();

        let result = mutate::<Vec<String>, (), _>(&store, &locks, &config, "user-types", |_| {
            Err(StorageError::LockPoisoned.into())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(store.get("user-types").await.unwrap(), None);
    }

    /// Store wrapper whose reads report a revision that keeps advancing, as
    /// if another instance were writing the same key continuously.
    struct ContendedStore {
        inner: MemoryDocumentStore,
        bump: std::sync::atomic::AtomicU64,
    }

    #[async_trait]
    impl DocumentStore for ContendedStore {
        async fn get(&self, _key: &str) -> ReqbaseResult<Option<Value>> {
            let bump = self
                .bump
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Some(json!({"revision": bump, "value": []})))
        }

        async fn set(&self, key: &str, value: Value) -> ReqbaseResult<()> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> ReqbaseResult<()> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_write_conflict() {
        let store = ContendedStore {
            inner: MemoryDocumentStore::new(),
            bump: std::sync::atomic::AtomicU64::new(0),
        };
        let locks = KeyLocks::new();
        let config = StoreConfig::default().with_write_attempts(3);

        let result = mutate::<Vec<String>, _, _>(&store, &locks, &config, "user-types", |items| {
            items.push("x".to_string());
            Ok(Mutation::write(()))
        })
        .await;

        match result {
            Err(reqbase_core::ReqbaseError::Storage(StorageError::WriteConflict {
                key, ..
            })) => assert_eq!(key, "user-types"),
            other => panic!("expected write conflict, got {other:?}"),
        }
    }
}
