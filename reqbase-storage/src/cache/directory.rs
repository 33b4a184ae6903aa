//! Derived user directory, cached indefinitely until explicitly refreshed.

use async_trait::async_trait;
use reqbase_core::{ReqbaseResult, UserProfile};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Source of the account-id to profile mapping.
///
/// Abstracts the external lookup (assignable users in the current project)
/// so the cache can work against any tracker implementation.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Fetch the full directory projection.
    async fn fetch_directory(&self) -> ReqbaseResult<HashMap<String, UserProfile>>;
}

/// Directory cache. Not collection-backed: built from the external lookup,
/// with no TTL, refreshed only by an explicit call.
pub struct DirectoryCache {
    source: Arc<dyn DirectorySource>,
    users: RwLock<Option<HashMap<String, UserProfile>>>,
}

impl DirectoryCache {
    pub fn new(source: Arc<dyn DirectorySource>) -> Self {
        Self {
            source,
            users: RwLock::new(None),
        }
    }

    /// Whether the directory has been filled.
    pub fn is_populated(&self) -> bool {
        self.users.read().map(|u| u.is_some()).unwrap_or(false)
    }

    /// The current directory, filling it on first use.
    ///
    /// Fails soft: if the source errors the call logs a warning and returns
    /// an empty map, leaving the entry unset so a later read retries. Read
    /// paths (log-label resolution) must never hard-fail on the directory.
    pub async fn current(&self) -> HashMap<String, UserProfile> {
        if let Ok(users) = self.users.read() {
            if let Some(users) = users.as_ref() {
                return users.clone();
            }
        }
        match self.refresh().await {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!(error = %e, "directory fill failed, serving empty directory");
                HashMap::new()
            }
        }
    }

    /// Re-fetch the directory from the source and replace the cached copy.
    pub async fn refresh(&self) -> ReqbaseResult<HashMap<String, UserProfile>> {
        let fetched = self.source.fetch_directory().await?;
        if let Ok(mut users) = self.users.write() {
            *users = Some(fetched.clone());
        }
        Ok(fetched)
    }
}
