//! Document store abstraction over the key-value persistence layer.

use async_trait::async_trait;
use reqbase_core::{ReqbaseResult, StorageError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Uniform access to the persistence layer by logical key.
///
/// Implementations operate on a single key per call and provide no cross-key
/// atomicity and no compare-and-swap primitive. All higher-level consistency
/// (revision envelopes, staged restores) is layered on top by this crate.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read the document stored under `key`, or `None` if never written.
    async fn get(&self, key: &str) -> ReqbaseResult<Option<Value>>;

    /// Replace the document stored under `key`.
    async fn set(&self, key: &str, value: Value) -> ReqbaseResult<()>;

    /// Remove the document stored under `key`. Removing an absent key is Ok.
    async fn delete(&self, key: &str) -> ReqbaseResult<()>;
}

/// In-memory document store for tests and single-process use.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn key_count(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Whether a key currently holds a document.
    pub fn contains_key(&self, key: &str) -> bool {
        self.documents
            .read()
            .map(|d| d.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, key: &str) -> ReqbaseResult<Option<Value>> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(documents.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> ReqbaseResult<()> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        documents.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ReqbaseResult<()> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        documents.remove(key);
        Ok(())
    }
}
