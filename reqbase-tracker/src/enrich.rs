//! Read-side enrichment joining stored collections with tracker metadata.
//!
//! Everything here degrades on tracker failure rather than failing the
//! caller, with one exception: [`Enrichment::linked_issues`] propagates the
//! error, because the tracker data *is* the requested result there rather
//! than decoration on stored data.

use crate::client::IssueTracker;
use reqbase_core::{IssueDetails, ReqbaseResult};
use reqbase_storage::CollectionStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One issue on a dashboard row. `summary` is absent when the tracker call
/// degraded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardIssue {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One requirement with its linked issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub issues: Vec<DashboardIssue>,
}

/// Joins the collection store with the issue tracker.
pub struct Enrichment {
    store: Arc<CollectionStore>,
    tracker: Arc<dyn IssueTracker>,
}

impl Enrichment {
    pub fn new(store: Arc<CollectionStore>, tracker: Arc<dyn IssueTracker>) -> Self {
        Self { store, tracker }
    }

    /// Issue details for every join-table entry referencing the requirement.
    pub async fn linked_issues(&self, requirement_id: &str) -> ReqbaseResult<Vec<IssueDetails>> {
        let ids = self.store.issues_for_requirement(requirement_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.tracker.fetch_issues(&ids).await
    }

    /// Percentage of linked issues reporting a done status, rounded. A
    /// requirement with no linked issues is 0; a failed tracker call
    /// degrades to 0 with a warning.
    pub async fn progress(&self, requirement_id: &str) -> ReqbaseResult<u32> {
        let ids = self.store.issues_for_requirement(requirement_id).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let issues = match self.tracker.fetch_issues(&ids).await {
            Ok(issues) => issues,
            Err(e) => {
                tracing::warn!(requirement_id, error = %e, "progress degraded, tracker unavailable");
                return Ok(0);
            }
        };
        if issues.is_empty() {
            return Ok(0);
        }
        let done = issues.iter().filter(|issue| issue.is_done).count();
        Ok(((done as f64 / issues.len() as f64) * 100.0).round() as u32)
    }

    /// Every requirement with its linked issue ids and, when the tracker is
    /// reachable, their summaries.
    pub async fn dashboard(&self) -> ReqbaseResult<Vec<DashboardRow>> {
        let requirements = self.store.list_requirements().await?;
        let links = self.store.issue_links().await?;

        let issue_ids: Vec<String> = links.keys().cloned().collect();
        let summaries: HashMap<String, String> = if issue_ids.is_empty() {
            HashMap::new()
        } else {
            match self.tracker.fetch_issues(&issue_ids).await {
                Ok(issues) => issues
                    .into_iter()
                    .map(|issue| (issue.id, issue.summary))
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "dashboard degraded, summaries omitted");
                    HashMap::new()
                }
            }
        };

        Ok(requirements
            .into_iter()
            .map(|requirement| {
                let issues = links
                    .iter()
                    .filter(|(_, ids)| ids.iter().any(|id| id == &requirement.id))
                    .map(|(issue_id, _)| DashboardIssue {
                        id: issue_id.clone(),
                        summary: summaries.get(issue_id).cloned(),
                    })
                    .collect();
                DashboardRow {
                    id: requirement.id,
                    name: requirement.name,
                    description: requirement.description,
                    issues,
                }
            })
            .collect())
    }
}
