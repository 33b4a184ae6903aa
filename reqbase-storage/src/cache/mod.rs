//! Cache layer: per-instance mirrors of hot collections plus the derived
//! user directory.
//!
//! Cache coherence is per-instance; global truth lives only in the document
//! store. Every entry is either `Uninitialized` or `Populated`, and a miss
//! always self-heals by reading through to the adapter. Only the collection
//! store and the snapshot engine write to the cache; everything else reads
//! through the accessors.

pub mod collections;
pub mod directory;

pub use collections::{CacheEntryState, CollectionCache};
pub use directory::{DirectoryCache, DirectorySource};
