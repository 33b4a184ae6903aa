//! Read-through mirror of a configurable subset of collections.

use crate::config::StoreConfig;
use crate::document_store::DocumentStore;
use crate::occ;
use reqbase_core::keys::DEFAULT_CACHED_KEYS;
use reqbase_core::{ReqbaseResult, StorageError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Observable state of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntryState {
    Uninitialized,
    Populated,
}

enum Entry {
    Uninitialized,
    /// Last-known stored document; `None` means the key holds nothing.
    Populated(Option<Value>),
}

/// Per-instance mirror of the tracked collections.
///
/// Reads on tracked keys go through the cache (a miss fills synchronously
/// from the adapter); reads on untracked keys pass straight through without
/// being stored. Mutators refresh entries via [`CollectionCache::invalidate`]
/// after every successful write.
pub struct CollectionCache {
    store: Arc<dyn DocumentStore>,
    entries: RwLock<HashMap<String, Entry>>,
    tracked: Vec<String>,
    config: StoreConfig,
}

impl CollectionCache {
    /// Create a cache tracking the given logical keys.
    pub fn new(store: Arc<dyn DocumentStore>, tracked: Vec<String>, config: StoreConfig) -> Self {
        let entries = tracked
            .iter()
            .map(|key| (key.clone(), Entry::Uninitialized))
            .collect();
        Self {
            store,
            entries: RwLock::new(entries),
            tracked,
            config,
        }
    }

    /// Create a cache tracking the default subset (lookup collections and
    /// both checklists).
    pub fn with_defaults(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(
            store,
            DEFAULT_CACHED_KEYS.iter().map(|k| k.to_string()).collect(),
            StoreConfig::default(),
        )
    }

    /// Keys mirrored by this cache.
    pub fn tracked_keys(&self) -> &[String] {
        &self.tracked
    }

    /// Whether a key is mirrored by this cache.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.tracked.iter().any(|k| k == key)
    }

    /// Observable state of a key's entry. Untracked keys are always
    /// `Uninitialized`.
    pub fn state(&self, key: &str) -> ReqbaseResult<CacheEntryState> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(match entries.get(key) {
            Some(Entry::Populated(_)) => CacheEntryState::Populated,
            _ => CacheEntryState::Uninitialized,
        })
    }

    /// The populated value for a key, without triggering a fill.
    pub fn peek(&self, key: &str) -> ReqbaseResult<Option<Value>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(match entries.get(key) {
            Some(Entry::Populated(value)) => value.clone(),
            _ => None,
        })
    }

    /// Read a key, cache-first.
    ///
    /// A tracked key with an uninitialized entry fills synchronously from
    /// the adapter and stores the result; a miss always self-heals.
    pub async fn get(&self, key: &str) -> ReqbaseResult<Option<Value>> {
        if !self.is_tracked(key) {
            return occ::fetch(self.store.as_ref(), key, self.config.op_timeout).await;
        }
        {
            let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
            if let Some(Entry::Populated(value)) = entries.get(key) {
                return Ok(value.clone());
            }
        }
        let fetched = occ::fetch(self.store.as_ref(), key, self.config.op_timeout).await?;
        self.store_entry(key, Entry::Populated(fetched.clone()))?;
        Ok(fetched)
    }

    /// Re-fetch the given keys from the adapter and overwrite their entries.
    /// Untracked keys are ignored.
    ///
    /// A failed re-fetch demotes the entry to `Uninitialized` instead of
    /// leaving a stale value in place; the next read self-heals.
    pub async fn invalidate(&self, keys: &[&str]) -> ReqbaseResult<()> {
        for key in keys {
            if !self.is_tracked(key) {
                continue;
            }
            match occ::fetch(self.store.as_ref(), key, self.config.op_timeout).await {
                Ok(fetched) => self.store_entry(key, Entry::Populated(fetched))?,
                Err(e) => {
                    tracing::warn!(key, error = %e, "cache refresh failed, entry demoted");
                    self.store_entry(key, Entry::Uninitialized)?;
                }
            }
        }
        Ok(())
    }

    /// Reset every entry and fill all tracked keys from the adapter.
    /// Called at process start and after a snapshot restore.
    pub async fn prime_all(&self) -> ReqbaseResult<()> {
        self.reset()?;
        for key in self.tracked.clone() {
            let fetched = occ::fetch(self.store.as_ref(), &key, self.config.op_timeout).await?;
            self.store_entry(&key, Entry::Populated(fetched))?;
        }
        Ok(())
    }

    /// Force every entry back to `Uninitialized` without fetching. Internal
    /// to prime/restore sequencing.
    pub(crate) fn reset(&self) -> ReqbaseResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        for key in &self.tracked {
            entries.insert(key.clone(), Entry::Uninitialized);
        }
        Ok(())
    }

    fn store_entry(&self, key: &str, entry: Entry) -> ReqbaseResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }
}
