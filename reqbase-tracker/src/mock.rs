//! In-memory mock tracker for tests and local runs.

use crate::client::IssueTracker;
use async_trait::async_trait;
use reqbase_core::{IssueDetails, ReqbaseResult, TrackerError, UserProfile};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Mock tracker serving canned issues and users.
#[derive(Default)]
pub struct MockIssueTracker {
    issues: RwLock<HashMap<String, IssueDetails>>,
    users: RwLock<Vec<UserProfile>>,
    failing: AtomicBool,
}

impl MockIssueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an issue, keyed by its id.
    pub fn insert_issue(&self, issue: IssueDetails) {
        if let Ok(mut issues) = self.issues.write() {
            issues.insert(issue.id.clone(), issue);
        }
    }

    /// Replace the assignable-user list.
    pub fn set_users(&self, users: Vec<UserProfile>) {
        if let Ok(mut stored) = self.users.write() {
            *stored = users;
        }
    }

    /// Make every call fail with a timeout until turned off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self, endpoint: &str) -> ReqbaseResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackerError::Timeout {
                endpoint: endpoint.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for MockIssueTracker {
    async fn fetch_issues(&self, ids: &[String]) -> ReqbaseResult<Vec<IssueDetails>> {
        self.check_available("issue/bulkfetch")?;
        let issues = self.issues.read().map_err(|_| TrackerError::InvalidResponse {
            reason: "mock poisoned".to_string(),
        })?;
        Ok(ids.iter().filter_map(|id| issues.get(id).cloned()).collect())
    }

    async fn assignable_users(&self) -> ReqbaseResult<Vec<UserProfile>> {
        self.check_available("user/search/query")?;
        let users = self.users.read().map_err(|_| TrackerError::InvalidResponse {
            reason: "mock poisoned".to_string(),
        })?;
        Ok(users.clone())
    }
}
