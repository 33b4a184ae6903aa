//! Issue-tracker HTTP client.

use async_trait::async_trait;
use reqbase_core::{IssueDetails, ReqbaseResult, TrackerError, UserProfile};
use reqbase_storage::DirectorySource;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Status names the tracker reports for completed work.
pub const DONE_STATUS_NAMES: [&str; 3] = ["Done", "Closed", "Resolved"];

const AVATAR_SIZE: &str = "48x48";

/// Batch-lookup access to the external issue tracker.
///
/// Implementations must tolerate arbitrary latency and transient failure;
/// callers treat everything returned here as enrichment, never as
/// correctness-critical state.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Summary metadata for a batch of issue ids or keys.
    async fn fetch_issues(&self, ids: &[String]) -> ReqbaseResult<Vec<IssueDetails>>;

    /// Users assignable in the current project.
    async fn assignable_users(&self) -> ReqbaseResult<Vec<UserProfile>>;
}

/// HTTP client for a Jira-compatible tracker REST API.
pub struct HttpIssueTracker {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
}

impl HttpIssueTracker {
    /// Create a client. Every request carries a bounded timeout.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            timeout,
        }
    }

    async fn post_json<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> ReqbaseResult<Res> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| send_error(endpoint, &e))?;
        decode_response(endpoint, response).await
    }

    async fn get_json<Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> ReqbaseResult<Res> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .query(query)
            .send()
            .await
            .map_err(|e| send_error(endpoint, &e))?;
        decode_response(endpoint, response).await
    }
}

#[async_trait]
impl IssueTracker for HttpIssueTracker {
    async fn fetch_issues(&self, ids: &[String]) -> ReqbaseResult<Vec<IssueDetails>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = BulkFetchRequest {
            issue_ids_or_keys: ids,
            fields: &["summary", "status", "priority", "assignee"],
        };
        let response: BulkFetchResponse =
            self.post_json("rest/api/3/issue/bulkfetch", &request).await?;
        Ok(response.issues.into_iter().map(IssueDto::into_details).collect())
    }

    async fn assignable_users(&self) -> ReqbaseResult<Vec<UserProfile>> {
        let projects: ValuesDto<ProjectDto> =
            self.get_json("rest/api/3/project/search", &[]).await?;
        let Some(project) = projects.values.into_iter().next() else {
            return Err(TrackerError::InvalidResponse {
                reason: "no visible projects".to_string(),
            }
            .into());
        };
        let users: ValuesDto<UserDto> = self
            .get_json(
                "rest/api/3/user/search/query",
                &[("query", format!("is assignee of {}", project.key))],
            )
            .await?;
        Ok(users.values.into_iter().map(UserDto::into_profile).collect())
    }
}

/// Adapts any tracker into a [`DirectorySource`] for the cache layer.
pub struct TrackerDirectory<T: ?Sized> {
    tracker: Arc<T>,
}

impl<T: IssueTracker + ?Sized> TrackerDirectory<T> {
    pub fn new(tracker: Arc<T>) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl<T: IssueTracker + ?Sized> DirectorySource for TrackerDirectory<T> {
    async fn fetch_directory(&self) -> ReqbaseResult<HashMap<String, UserProfile>> {
        let users = self.tracker.assignable_users().await?;
        Ok(users
            .into_iter()
            .map(|user| (user.account_id.clone(), user))
            .collect())
    }
}

fn send_error(endpoint: &str, e: &reqwest::Error) -> reqbase_core::ReqbaseError {
    if e.is_timeout() {
        TrackerError::Timeout {
            endpoint: endpoint.to_string(),
        }
        .into()
    } else {
        TrackerError::RequestFailed {
            endpoint: endpoint.to_string(),
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
        .into()
    }
}

async fn decode_response<Res: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> ReqbaseResult<Res> {
    let status = response.status();
    if status.is_success() {
        response.json().await.map_err(|e| {
            TrackerError::InvalidResponse {
                reason: e.to_string(),
            }
            .into()
        })
    } else {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(TrackerError::RequestFailed {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        }
        .into())
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
struct BulkFetchRequest<'a> {
    #[serde(rename = "issueIdsOrKeys")]
    issue_ids_or_keys: &'a [String],
    fields: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct BulkFetchResponse {
    #[serde(default)]
    issues: Vec<IssueDto>,
}

#[derive(Debug, Deserialize)]
struct IssueDto {
    id: String,
    key: String,
    fields: IssueFieldsDto,
}

#[derive(Debug, Deserialize)]
struct IssueFieldsDto {
    #[serde(default)]
    summary: String,
    status: Option<NamedDto>,
    priority: Option<NamedDto>,
    assignee: Option<UserDto>,
}

#[derive(Debug, Deserialize)]
struct NamedDto {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDto {
    account_id: String,
    display_name: String,
    #[serde(default)]
    avatar_urls: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ValuesDto<T> {
    #[serde(default)]
    values: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ProjectDto {
    key: String,
}

impl IssueDto {
    fn into_details(self) -> IssueDetails {
        let status = self.fields.status.map(|s| s.name).unwrap_or_default();
        let is_done = DONE_STATUS_NAMES.contains(&status.as_str());
        IssueDetails {
            id: self.id,
            key: self.key,
            summary: self.fields.summary,
            status,
            priority: self.fields.priority.map(|p| p.name).unwrap_or_default(),
            assignee: self.fields.assignee.map(UserDto::into_profile),
            is_done,
        }
    }
}

impl UserDto {
    fn into_profile(self) -> UserProfile {
        let avatar_url = self
            .avatar_urls
            .as_ref()
            .and_then(|urls| urls.get(AVATAR_SIZE).cloned());
        UserProfile {
            account_id: self.account_id,
            display_name: self.display_name,
            avatar_url,
        }
    }
}
