//! Reqbase Storage - Collection Store, Cache Layer, Snapshot Engine
//!
//! CRUD over typed collections persisted through the [`DocumentStore`]
//! abstraction, a per-instance read-through cache, and compressed
//! point-in-time snapshots of the whole tracked data set.
//!
//! The document store offers single-key get/set/delete only - no cross-key
//! atomicity and no compare-and-swap. Every collection therefore persists
//! inside a revision [`Envelope`], and mutations run through a guarded
//! read-verify-write path that surfaces lost updates as write conflicts.

pub mod cache;
pub mod collections;
pub mod config;
pub mod document_store;
pub mod envelope;
mod occ;
pub mod snapshot;

pub use cache::{CacheEntryState, CollectionCache, DirectoryCache, DirectorySource};
pub use collections::CollectionStore;
pub use config::StoreConfig;
pub use document_store::{DocumentStore, MemoryDocumentStore};
pub use envelope::Envelope;
pub use snapshot::SnapshotEngine;
