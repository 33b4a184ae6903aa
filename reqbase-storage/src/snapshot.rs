//! Snapshot engine: bundle-level backup and restore of every tracked
//! collection.
//!
//! A version's payload is the map of logical key to stored document,
//! captured straight from the adapter (the cache is bypassed so a stale
//! mirror can never leak into a snapshot), serialized as JSON, deflated,
//! and stored as base64 text. Restore is staged: the payload lands under
//! `<key>.restore` staging keys and is verified before any live key is
//! touched, then swapped in key by key.

use crate::cache::CollectionCache;
use crate::config::StoreConfig;
use crate::document_store::DocumentStore;
use crate::envelope::Envelope;
use crate::occ::{self, KeyLocks, Mutation};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use reqbase_core::keys::{SNAPSHOT_KEYS, VERSIONS_KEY};
use reqbase_core::{
    ReqbaseResult, SnapshotError, StorageError, ValidationError, VersionRecord, VersionSummary,
};
use serde_json::{Map, Value};
use std::io::{Read, Write};
use std::sync::Arc;

/// Point-in-time backup and restore over the document store.
pub struct SnapshotEngine {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CollectionCache>,
    locks: KeyLocks,
    config: StoreConfig,
}

impl SnapshotEngine {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<CollectionCache>) -> Self {
        Self::with_config(store, cache, StoreConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CollectionCache>,
        config: StoreConfig,
    ) -> Self {
        Self {
            store,
            cache,
            locks: KeyLocks::new(),
            config,
        }
    }

    /// Version summaries, oldest first. Payloads are omitted.
    pub async fn list_versions(&self) -> ReqbaseResult<Vec<VersionSummary>> {
        let versions = self.read_catalog().await?;
        Ok(versions.iter().map(VersionSummary::from).collect())
    }

    /// Capture every tracked key and append a new version to the catalog.
    pub async fn create_version(
        &self,
        key: &str,
        description: &str,
    ) -> ReqbaseResult<VersionRecord> {
        if key.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "key".to_string(),
            }
            .into());
        }

        // Adapter truth, never the cache.
        let mut payload = Map::new();
        for tracked in SNAPSHOT_KEYS {
            if let Some(stored) =
                occ::fetch(self.store.as_ref(), tracked, self.config.op_timeout).await?
            {
                payload.insert(tracked.to_string(), stored);
            }
        }

        let record = VersionRecord {
            key: key.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            data: compress_payload(&Value::Object(payload))?,
        };

        occ::mutate::<Vec<VersionRecord>, _, _>(
            self.store.as_ref(),
            &self.locks,
            &self.config,
            VERSIONS_KEY,
            |versions| {
                if versions.iter().any(|v| v.key == key) {
                    return Err(SnapshotError::DuplicateVersion {
                        key: key.to_string(),
                    }
                    .into());
                }
                versions.push(record.clone());
                Ok(Mutation::write(record.clone()))
            },
        )
        .await
    }

    /// Remove a version by key. Removing an absent key is a no-op.
    pub async fn remove_version(&self, key: &str) -> ReqbaseResult<()> {
        occ::mutate::<Vec<VersionRecord>, _, _>(
            self.store.as_ref(),
            &self.locks,
            &self.config,
            VERSIONS_KEY,
            |versions| {
                let before = versions.len();
                versions.retain(|v| v.key != key);
                Ok(if versions.len() == before {
                    Mutation::skip(())
                } else {
                    Mutation::write(())
                })
            },
        )
        .await
    }

    /// Replace every tracked collection with the named version's payload and
    /// re-prime the cache layer.
    pub async fn restore_version(&self, key: &str) -> ReqbaseResult<()> {
        let versions = self.read_catalog().await?;
        let record = versions
            .iter()
            .find(|v| v.key == key)
            .ok_or_else(|| SnapshotError::VersionNotFound {
                key: key.to_string(),
            })?;

        // Decode fully before touching storage; a corrupt payload must not
        // be partially applied.
        let payload = decompress_payload(&record.data)?;
        let documents = payload
            .as_object()
            .ok_or_else(|| SnapshotError::CorruptPayload {
                reason: "payload is not a key map".to_string(),
            })?;

        // Stage phase. Live keys stay untouched until every staged document
        // has been written and read back.
        let mut staged: Vec<&str> = Vec::new();
        for tracked in SNAPSHOT_KEYS {
            let Some(document) = documents.get(tracked) else {
                continue;
            };
            let staging = staging_key(tracked);
            let result =
                occ::put(self.store.as_ref(), &staging, document.clone(), self.config.op_timeout)
                    .await;
            if let Err(e) = result {
                self.discard_staging(&staged).await;
                return Err(e);
            }
            let echoed =
                occ::fetch(self.store.as_ref(), &staging, self.config.op_timeout).await?;
            if echoed.as_ref() != Some(document) {
                self.discard_staging(&staged).await;
                return Err(StorageError::Backend {
                    key: staging,
                    reason: "staging verification mismatch".to_string(),
                }
                .into());
            }
            staged.push(tracked);
        }

        // Swap phase: per-key replace, failures collected rather than
        // aborting so the damage is reported in full.
        let mut failed: Vec<String> = Vec::new();
        for tracked in SNAPSHOT_KEYS {
            let result = match documents.get(tracked) {
                Some(document) => {
                    occ::put(self.store.as_ref(), tracked, document.clone(), self.config.op_timeout)
                        .await
                }
                None => occ::remove(self.store.as_ref(), tracked, self.config.op_timeout).await,
            };
            if let Err(e) = result {
                tracing::warn!(key = tracked, error = %e, "restore swap failed for key");
                failed.push(tracked.to_string());
            }
        }
        self.discard_staging(&staged).await;

        if !failed.is_empty() {
            // The store is mixed; reprime so the cache at least mirrors
            // whatever storage now holds before surfacing the failure.
            if let Err(e) = self.cache.prime_all().await {
                tracing::warn!(error = %e, "cache reprime failed after partial restore");
            }
            return Err(SnapshotError::RestoreIncomplete { keys: failed }.into());
        }

        self.cache.prime_all().await
    }

    async fn read_catalog(&self) -> ReqbaseResult<Vec<VersionRecord>> {
        let stored = occ::fetch(self.store.as_ref(), VERSIONS_KEY, self.config.op_timeout).await?;
        Ok(Envelope::<Vec<VersionRecord>>::decode(VERSIONS_KEY, stored)?.value)
    }

    async fn discard_staging(&self, staged: &[&str]) {
        for tracked in staged {
            let staging = staging_key(tracked);
            if let Err(e) =
                occ::remove(self.store.as_ref(), &staging, self.config.op_timeout).await
            {
                tracing::warn!(key = %staging, error = %e, "failed to discard staging key");
            }
        }
    }
}

fn staging_key(key: &str) -> String {
    format!("{key}.restore")
}

/// Deflate and base64-encode a snapshot payload.
fn compress_payload(payload: &Value) -> ReqbaseResult<String> {
    let json = serde_json::to_vec(payload).map_err(|e| StorageError::Serialization {
        key: VERSIONS_KEY.to_string(),
        reason: e.to_string(),
    })?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map(|bytes| BASE64.encode(bytes))
        .map_err(|e| {
            StorageError::Serialization {
                key: VERSIONS_KEY.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
}

/// Decode a stored snapshot payload. Any decode failure is a corrupt
/// snapshot, reported before a single key is written.
fn decompress_payload(data: &str) -> ReqbaseResult<Value> {
    let bytes = BASE64.decode(data).map_err(|e| SnapshotError::CorruptPayload {
        reason: format!("base64: {e}"),
    })?;
    let mut decoder = ZlibDecoder::new(&bytes[..]);
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| SnapshotError::CorruptPayload {
            reason: format!("inflate: {e}"),
        })?;
    serde_json::from_slice(&json).map_err(|e| {
        SnapshotError::CorruptPayload {
            reason: format!("json: {e}"),
        }
        .into()
    })
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
