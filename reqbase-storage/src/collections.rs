//! Document collection store.
//!
//! Typed CRUD over each collection, change-tracking for requirements, and
//! join-table maintenance. Every mutation is a guarded read-modify-write on
//! the collection's single logical key, followed by a cache refresh for the
//! keys it touched.
//!
//! Activity-log lines are stored as
//! `{{@<account-id>@}} <message> {{#<YYYY-MM-DD HH:MM>#}}`. Field values
//! referencing other records (type, stage, status, assignee, checklist ids)
//! are resolved to display labels when the line is written; the actor
//! marker is substituted with the current display name when the record is
//! read, so a later rename shows up in historical entries too.

use crate::cache::{CollectionCache, DirectoryCache};
use crate::config::StoreConfig;
use crate::document_store::DocumentStore;
use crate::envelope::Envelope;
use crate::occ::{self, KeyLocks, Mutation};
use chrono::Utc;
use reqbase_core::keys::{
    ISSUE_JOIN_KEY, REQUIREMENTS_KEY, STAGES_KEY, STATUS_KEY, TYPES_KEY,
    VALIDATION_CHECKLIST_KEY, VERIFICATION_CHECKLIST_KEY,
};
use reqbase_core::{
    format_log_timestamp, generate_record_id, ChecklistItem, ChecklistUpdate, IssueLinks,
    LookupDraft, LookupItem, LookupUpdate, RecordKind, ReqbaseError, ReqbaseResult, Requirement,
    RequirementDraft, RequirementUpdate, StorageError, UserProfile, ValidationError,
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Records addressable by id within their collection.
trait Keyed {
    fn record_id(&self) -> &str;
}

impl Keyed for Requirement {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Keyed for LookupItem {
    fn record_id(&self) -> &str {
        &self.id
    }
}

impl Keyed for ChecklistItem {
    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Display labels resolved through the cache layer for log lines.
struct LabelContext {
    types: HashMap<String, String>,
    stages: HashMap<String, String>,
    statuses: HashMap<String, String>,
    validation: HashMap<String, String>,
    verification: HashMap<String, String>,
    users: HashMap<String, UserProfile>,
}

/// CRUD access to every collection, backed by the document store and the
/// injected cache layer.
pub struct CollectionStore {
    store: Arc<dyn DocumentStore>,
    cache: Arc<CollectionCache>,
    directory: Arc<DirectoryCache>,
    locks: KeyLocks,
    config: StoreConfig,
}

impl CollectionStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CollectionCache>,
        directory: Arc<DirectoryCache>,
    ) -> Self {
        Self::with_config(store, cache, directory, StoreConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn DocumentStore>,
        cache: Arc<CollectionCache>,
        directory: Arc<DirectoryCache>,
        config: StoreConfig,
    ) -> Self {
        Self {
            store,
            cache,
            directory,
            locks: KeyLocks::new(),
            config,
        }
    }

    /// Fill every tracked cache entry. Called once at process start.
    pub async fn prime_cache(&self) -> ReqbaseResult<()> {
        self.cache.prime_all().await
    }

    // === Requirements ===

    /// All requirements, with log-line actors resolved to display names.
    pub async fn list_requirements(&self) -> ReqbaseResult<Vec<Requirement>> {
        let mut items: Vec<Requirement> = self.read_collection(REQUIREMENTS_KEY).await?;
        let users = self.directory.current().await;
        for item in &mut items {
            resolve_log_actors(item, &users);
        }
        Ok(items)
    }

    /// One requirement by id.
    pub async fn get_requirement(&self, id: &str) -> ReqbaseResult<Requirement> {
        let items: Vec<Requirement> = self.read_collection(REQUIREMENTS_KEY).await?;
        let mut item = items
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| not_found(RecordKind::Requirement, id))?;
        let users = self.directory.current().await;
        resolve_log_actors(&mut item, &users);
        Ok(item)
    }

    /// Create a requirement with empty check sets.
    pub async fn add_requirement(
        &self,
        actor: &str,
        draft: RequirementDraft,
    ) -> ReqbaseResult<Requirement> {
        if draft.name.trim().is_empty() {
            return Err(required("name"));
        }
        let record = Requirement {
            id: generate_record_id(RecordKind::Requirement),
            name: draft.name.clone(),
            description: draft.description,
            type_id: draft.type_id,
            stage_id: draft.stage_id,
            status_id: draft.status_id,
            assignee_id: draft.assignee_id,
            validation_checks: Vec::new(),
            verification_checks: Vec::new(),
            activity_log: vec![log_line(
                actor,
                &format!("created requirement \"{}\"", draft.name),
            )],
        };
        let mut created = self
            .mutate_collection::<Vec<Requirement>, _, _>(REQUIREMENTS_KEY, |items| {
                items.push(record.clone());
                Ok(Mutation::write(record.clone()))
            })
            .await?;
        let users = self.directory.current().await;
        resolve_log_actors(&mut created, &users);
        Ok(created)
    }

    /// Update a requirement, appending one activity-log line per changed
    /// field. Returns the stored record with actors resolved.
    pub async fn update_requirement(
        &self,
        actor: &str,
        id: &str,
        update: RequirementUpdate,
    ) -> ReqbaseResult<Requirement> {
        let labels = self.label_context().await;
        let mut updated = self
            .mutate_collection::<Vec<Requirement>, Requirement, _>(REQUIREMENTS_KEY, |items| {
                let existing = items
                    .iter_mut()
                    .find(|r| r.id == id)
                    .ok_or_else(|| not_found(RecordKind::Requirement, id))?;

                let mut lines: Vec<String> = Vec::new();
                if let Some(name) = &update.name {
                    if name != &existing.name {
                        lines.push(log_line(
                            actor,
                            &format!(
                                "changed name from \"{}\" to \"{}\"",
                                existing.name, name
                            ),
                        ));
                        existing.name = name.clone();
                    }
                }
                if let Some(description) = &update.description {
                    let old = existing.description.clone().unwrap_or_default();
                    if description != &old {
                        lines.push(log_line(
                            actor,
                            &format!("changed description from \"{old}\" to \"{description}\""),
                        ));
                        existing.description = Some(description.clone());
                    }
                }
                if let Some(type_id) = &update.type_id {
                    if existing.type_id.as_deref() != Some(type_id.as_str()) {
                        let from = reference_label(&labels.types, existing.type_id.as_deref());
                        let to = reference_label(&labels.types, Some(type_id));
                        lines.push(log_line(
                            actor,
                            &format!("changed type from \"{from}\" to \"{to}\""),
                        ));
                        existing.type_id = Some(type_id.clone());
                    }
                }
                if let Some(stage_id) = &update.stage_id {
                    if existing.stage_id.as_deref() != Some(stage_id.as_str()) {
                        let from = reference_label(&labels.stages, existing.stage_id.as_deref());
                        let to = reference_label(&labels.stages, Some(stage_id));
                        lines.push(log_line(
                            actor,
                            &format!("changed stage from \"{from}\" to \"{to}\""),
                        ));
                        existing.stage_id = Some(stage_id.clone());
                    }
                }
                if let Some(status_id) = &update.status_id {
                    if existing.status_id.as_deref() != Some(status_id.as_str()) {
                        let from = reference_label(&labels.statuses, existing.status_id.as_deref());
                        let to = reference_label(&labels.statuses, Some(status_id));
                        lines.push(log_line(
                            actor,
                            &format!("changed status from \"{from}\" to \"{to}\""),
                        ));
                        existing.status_id = Some(status_id.clone());
                    }
                }
                if let Some(assignee_id) = &update.assignee_id {
                    if existing.assignee_id.as_deref() != Some(assignee_id.as_str()) {
                        let from = user_label(&labels.users, existing.assignee_id.as_deref());
                        let to = user_label(&labels.users, Some(assignee_id));
                        lines.push(log_line(
                            actor,
                            &format!("changed assignee from \"{from}\" to \"{to}\""),
                        ));
                        existing.assignee_id = Some(assignee_id.clone());
                    }
                }
                if let Some(checks) = &update.validation_checks {
                    if checks != &existing.validation_checks {
                        let from = checks_label(&labels.validation, &existing.validation_checks);
                        let to = checks_label(&labels.validation, checks);
                        lines.push(log_line(
                            actor,
                            &format!("changed validation checks from \"{from}\" to \"{to}\""),
                        ));
                        existing.validation_checks = checks.clone();
                    }
                }
                if let Some(checks) = &update.verification_checks {
                    if checks != &existing.verification_checks {
                        let from =
                            checks_label(&labels.verification, &existing.verification_checks);
                        let to = checks_label(&labels.verification, checks);
                        lines.push(log_line(
                            actor,
                            &format!("changed verification checks from \"{from}\" to \"{to}\""),
                        ));
                        existing.verification_checks = checks.clone();
                    }
                }

                if lines.is_empty() {
                    return Ok(Mutation::skip(existing.clone()));
                }
                existing.activity_log.extend(lines);
                Ok(Mutation::write(existing.clone()))
            })
            .await?;
        resolve_log_actors(&mut updated, &labels.users);
        Ok(updated)
    }

    /// Delete a requirement and prune it from every join-table entry.
    pub async fn delete_requirement(&self, id: &str) -> ReqbaseResult<()> {
        self.remove_record::<Requirement>(REQUIREMENTS_KEY, RecordKind::Requirement, id)
            .await?;
        self.mutate_collection::<IssueLinks, _, _>(ISSUE_JOIN_KEY, |links| {
            let mut changed = false;
            for ids in links.values_mut() {
                let before = ids.len();
                ids.retain(|r| r != id);
                changed |= ids.len() != before;
            }
            Ok(if changed {
                Mutation::write(())
            } else {
                Mutation::skip(())
            })
        })
        .await
    }

    // === Types / stages / statuses ===

    pub async fn list_types(&self) -> ReqbaseResult<Vec<LookupItem>> {
        self.read_collection(TYPES_KEY).await
    }

    pub async fn add_type(&self, draft: LookupDraft) -> ReqbaseResult<LookupItem> {
        self.add_lookup_item(TYPES_KEY, RecordKind::Type, draft).await
    }

    pub async fn update_type(&self, id: &str, update: LookupUpdate) -> ReqbaseResult<LookupItem> {
        self.update_lookup_item(TYPES_KEY, RecordKind::Type, id, update)
            .await
    }

    pub async fn remove_type(&self, id: &str) -> ReqbaseResult<()> {
        self.remove_record::<LookupItem>(TYPES_KEY, RecordKind::Type, id)
            .await
    }

    pub async fn list_stages(&self) -> ReqbaseResult<Vec<LookupItem>> {
        self.read_collection(STAGES_KEY).await
    }

    pub async fn add_stage(&self, draft: LookupDraft) -> ReqbaseResult<LookupItem> {
        self.add_lookup_item(STAGES_KEY, RecordKind::Stage, draft).await
    }

    pub async fn update_stage(&self, id: &str, update: LookupUpdate) -> ReqbaseResult<LookupItem> {
        self.update_lookup_item(STAGES_KEY, RecordKind::Stage, id, update)
            .await
    }

    pub async fn remove_stage(&self, id: &str) -> ReqbaseResult<()> {
        self.remove_record::<LookupItem>(STAGES_KEY, RecordKind::Stage, id)
            .await
    }

    pub async fn list_statuses(&self) -> ReqbaseResult<Vec<LookupItem>> {
        self.read_collection(STATUS_KEY).await
    }

    pub async fn add_status(&self, draft: LookupDraft) -> ReqbaseResult<LookupItem> {
        self.add_lookup_item(STATUS_KEY, RecordKind::Status, draft)
            .await
    }

    pub async fn update_status(&self, id: &str, update: LookupUpdate) -> ReqbaseResult<LookupItem> {
        self.update_lookup_item(STATUS_KEY, RecordKind::Status, id, update)
            .await
    }

    pub async fn remove_status(&self, id: &str) -> ReqbaseResult<()> {
        self.remove_record::<LookupItem>(STATUS_KEY, RecordKind::Status, id)
            .await
    }

    // === Checklists ===

    pub async fn list_validation_items(&self) -> ReqbaseResult<Vec<ChecklistItem>> {
        self.read_collection(VALIDATION_CHECKLIST_KEY).await
    }

    pub async fn add_validation_item(&self, name: &str) -> ReqbaseResult<ChecklistItem> {
        self.add_checklist_item(VALIDATION_CHECKLIST_KEY, RecordKind::Validation, name)
            .await
    }

    pub async fn update_validation_item(
        &self,
        id: &str,
        update: ChecklistUpdate,
    ) -> ReqbaseResult<ChecklistItem> {
        self.update_checklist_item(VALIDATION_CHECKLIST_KEY, RecordKind::Validation, id, update)
            .await
    }

    pub async fn remove_validation_item(&self, id: &str) -> ReqbaseResult<()> {
        self.remove_record::<ChecklistItem>(VALIDATION_CHECKLIST_KEY, RecordKind::Validation, id)
            .await
    }

    pub async fn list_verification_items(&self) -> ReqbaseResult<Vec<ChecklistItem>> {
        self.read_collection(VERIFICATION_CHECKLIST_KEY).await
    }

    pub async fn add_verification_item(&self, name: &str) -> ReqbaseResult<ChecklistItem> {
        self.add_checklist_item(VERIFICATION_CHECKLIST_KEY, RecordKind::Verification, name)
            .await
    }

    pub async fn update_verification_item(
        &self,
        id: &str,
        update: ChecklistUpdate,
    ) -> ReqbaseResult<ChecklistItem> {
        self.update_checklist_item(
            VERIFICATION_CHECKLIST_KEY,
            RecordKind::Verification,
            id,
            update,
        )
        .await
    }

    pub async fn remove_verification_item(&self, id: &str) -> ReqbaseResult<()> {
        self.remove_record::<ChecklistItem>(VERIFICATION_CHECKLIST_KEY, RecordKind::Verification, id)
            .await
    }

    // === Join table ===

    /// Replace the requirement ids assigned to an issue. Every id must
    /// belong to the requirements collection at mutation time.
    pub async fn assign_issue(
        &self,
        issue_id: &str,
        requirement_ids: Vec<String>,
    ) -> ReqbaseResult<()> {
        if issue_id.trim().is_empty() {
            return Err(required("issueId"));
        }
        let known: HashSet<String> = self
            .read_collection::<Vec<Requirement>>(REQUIREMENTS_KEY)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        for id in &requirement_ids {
            if !known.contains(id) {
                return Err(not_found(RecordKind::Requirement, id));
            }
        }
        self.mutate_collection::<IssueLinks, _, _>(ISSUE_JOIN_KEY, |links| {
            links.insert(issue_id.to_string(), requirement_ids.clone());
            Ok(Mutation::write(()))
        })
        .await
    }

    /// Requirements assigned to an issue. Dangling ids are skipped.
    pub async fn requirements_for_issue(&self, issue_id: &str) -> ReqbaseResult<Vec<Requirement>> {
        let links: IssueLinks = self.read_collection(ISSUE_JOIN_KEY).await?;
        let Some(ids) = links.get(issue_id) else {
            return Ok(Vec::new());
        };
        let all: Vec<Requirement> = self.read_collection(REQUIREMENTS_KEY).await?;
        let by_id: HashMap<&str, &Requirement> =
            all.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut assigned = Vec::with_capacity(ids.len());
        for id in ids {
            match by_id.get(id.as_str()) {
                Some(record) => assigned.push((*record).clone()),
                None => tracing::debug!(issue_id, requirement_id = %id, "dangling join entry"),
            }
        }
        Ok(assigned)
    }

    /// Issue ids whose assignments reference the requirement.
    pub async fn issues_for_requirement(&self, requirement_id: &str) -> ReqbaseResult<Vec<String>> {
        let links: IssueLinks = self.read_collection(ISSUE_JOIN_KEY).await?;
        Ok(links
            .iter()
            .filter(|(_, ids)| ids.iter().any(|id| id == requirement_id))
            .map(|(issue_id, _)| issue_id.clone())
            .collect())
    }

    /// The whole join table.
    pub async fn issue_links(&self) -> ReqbaseResult<IssueLinks> {
        self.read_collection(ISSUE_JOIN_KEY).await
    }

    // === Internals ===

    async fn read_collection<T>(&self, key: &str) -> ReqbaseResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let stored = self.cache.get(key).await?;
        Ok(Envelope::<T>::decode(key, stored)?.value)
    }

    async fn mutate_collection<T, R, F>(&self, key: &str, apply: F) -> ReqbaseResult<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnMut(&mut T) -> ReqbaseResult<Mutation<R>>,
    {
        let result = occ::mutate(self.store.as_ref(), &self.locks, &self.config, key, apply).await?;
        self.cache.invalidate(&[key]).await?;
        Ok(result)
    }

    async fn add_lookup_item(
        &self,
        key: &str,
        kind: RecordKind,
        draft: LookupDraft,
    ) -> ReqbaseResult<LookupItem> {
        if draft.name.trim().is_empty() {
            return Err(required("name"));
        }
        let record = LookupItem {
            id: generate_record_id(kind),
            name: draft.name,
            color: draft.color,
        };
        self.mutate_collection::<Vec<LookupItem>, _, _>(key, |items| {
            items.push(record.clone());
            Ok(Mutation::write(record.clone()))
        })
        .await
    }

    async fn update_lookup_item(
        &self,
        key: &str,
        kind: RecordKind,
        id: &str,
        update: LookupUpdate,
    ) -> ReqbaseResult<LookupItem> {
        self.mutate_collection::<Vec<LookupItem>, _, _>(key, |items| {
            let existing = items
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| not_found(kind, id))?;
            let mut dirty = false;
            if let Some(name) = &update.name {
                if name != &existing.name {
                    existing.name = name.clone();
                    dirty = true;
                }
            }
            if let Some(color) = &update.color {
                if color != &existing.color {
                    existing.color = color.clone();
                    dirty = true;
                }
            }
            Ok(if dirty {
                Mutation::write(existing.clone())
            } else {
                Mutation::skip(existing.clone())
            })
        })
        .await
    }

    async fn add_checklist_item(
        &self,
        key: &str,
        kind: RecordKind,
        name: &str,
    ) -> ReqbaseResult<ChecklistItem> {
        if name.trim().is_empty() {
            return Err(required("name"));
        }
        let record = ChecklistItem {
            id: generate_record_id(kind),
            name: name.to_string(),
        };
        self.mutate_collection::<Vec<ChecklistItem>, _, _>(key, |items| {
            items.push(record.clone());
            Ok(Mutation::write(record.clone()))
        })
        .await
    }

    async fn update_checklist_item(
        &self,
        key: &str,
        kind: RecordKind,
        id: &str,
        update: ChecklistUpdate,
    ) -> ReqbaseResult<ChecklistItem> {
        self.mutate_collection::<Vec<ChecklistItem>, _, _>(key, |items| {
            let existing = items
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or_else(|| not_found(kind, id))?;
            let mut dirty = false;
            if let Some(name) = &update.name {
                if name != &existing.name {
                    existing.name = name.clone();
                    dirty = true;
                }
            }
            Ok(if dirty {
                Mutation::write(existing.clone())
            } else {
                Mutation::skip(existing.clone())
            })
        })
        .await
    }

    async fn remove_record<T>(&self, key: &str, kind: RecordKind, id: &str) -> ReqbaseResult<()>
    where
        T: Keyed + Serialize + DeserializeOwned,
    {
        self.mutate_collection::<Vec<T>, _, _>(key, |items| {
            let before = items.len();
            items.retain(|item| item.record_id() != id);
            if items.len() == before {
                return Err(not_found(kind, id));
            }
            Ok(Mutation::write(()))
        })
        .await
    }

    /// Labels for log lines, resolved through the cache and directory.
    /// Resolution is enrichment: a failed read degrades to raw ids.
    async fn label_context(&self) -> LabelContext {
        LabelContext {
            types: self.labels_for_lookup(TYPES_KEY).await,
            stages: self.labels_for_lookup(STAGES_KEY).await,
            statuses: self.labels_for_lookup(STATUS_KEY).await,
            validation: self.labels_for_checklist(VALIDATION_CHECKLIST_KEY).await,
            verification: self.labels_for_checklist(VERIFICATION_CHECKLIST_KEY).await,
            users: self.directory.current().await,
        }
    }

    async fn labels_for_lookup(&self, key: &str) -> HashMap<String, String> {
        match self.read_collection::<Vec<LookupItem>>(key).await {
            Ok(items) => items.into_iter().map(|i| (i.id, i.name)).collect(),
            Err(e) => {
                tracing::warn!(key, error = %e, "label resolution degraded to raw ids");
                HashMap::new()
            }
        }
    }

    async fn labels_for_checklist(&self, key: &str) -> HashMap<String, String> {
        match self.read_collection::<Vec<ChecklistItem>>(key).await {
            Ok(items) => items.into_iter().map(|i| (i.id, i.name)).collect(),
            Err(e) => {
                tracing::warn!(key, error = %e, "label resolution degraded to raw ids");
                HashMap::new()
            }
        }
    }
}

fn required(field: &str) -> ReqbaseError {
    ValidationError::RequiredFieldMissing {
        field: field.to_string(),
    }
    .into()
}

fn not_found(kind: RecordKind, id: &str) -> ReqbaseError {
    StorageError::NotFound {
        kind,
        id: id.to_string(),
    }
    .into()
}

fn log_line(actor: &str, message: &str) -> String {
    format!(
        "{{{{@{actor}@}}}} {message} {{{{#{}#}}}}",
        format_log_timestamp(Utc::now())
    )
}

fn reference_label(labels: &HashMap<String, String>, id: Option<&str>) -> String {
    match id {
        None => "none".to_string(),
        Some(id) => labels.get(id).cloned().unwrap_or_else(|| id.to_string()),
    }
}

fn user_label(users: &HashMap<String, UserProfile>, id: Option<&str>) -> String {
    match id {
        None => "none".to_string(),
        Some(id) => users
            .get(id)
            .map(|u| u.display_name.clone())
            .unwrap_or_else(|| id.to_string()),
    }
}

fn checks_label(labels: &HashMap<String, String>, ids: &[String]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| labels.get(id).cloned().unwrap_or_else(|| id.clone()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Substitute stored actor markers with current display names.
fn resolve_log_actors(record: &mut Requirement, users: &HashMap<String, UserProfile>) {
    for line in &mut record.activity_log {
        if let Some(rest) = line.strip_prefix("{{@") {
            if let Some((account, tail)) = rest.split_once("@}}") {
                let display = users
                    .get(account)
                    .map(|u| u.display_name.clone())
                    .unwrap_or_else(|| account.to_string());
                *line = format!("{display}{tail}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntryState, DirectorySource};
    use crate::document_store::MemoryDocumentStore;
    use async_trait::async_trait;

    struct StaticDirectory(HashMap<String, UserProfile>);

    #[async_trait]
    impl DirectorySource for StaticDirectory {
        async fn fetch_directory(&self) -> ReqbaseResult<HashMap<String, UserProfile>> {
            Ok(self.0.clone())
        }
    }

    fn profile(account_id: &str, display_name: &str) -> UserProfile {
        UserProfile {
            account_id: account_id.to_string(),
            display_name: display_name.to_string(),
            avatar_url: None,
        }
    }

    fn store_with_users(users: HashMap<String, UserProfile>) -> (Arc<MemoryDocumentStore>, CollectionStore) {
        let backend = Arc::new(MemoryDocumentStore::new());
        let cache = Arc::new(CollectionCache::with_defaults(
            Arc::clone(&backend) as Arc<dyn DocumentStore>
        ));
        let directory = Arc::new(DirectoryCache::new(Arc::new(StaticDirectory(users))));
        let store = CollectionStore::new(
            Arc::clone(&backend) as Arc<dyn DocumentStore>,
            cache,
            directory,
        );
        (backend, store)
    }

    fn empty_store() -> (Arc<MemoryDocumentStore>, CollectionStore) {
        store_with_users(HashMap::new())
    }

    #[tokio::test]
    async fn test_list_never_written_collection_is_empty() {
        let (_, store) = empty_store();
        assert!(store.list_requirements().await.unwrap().is_empty());
        assert!(store.list_types().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_update_delete_scenario() {
        let (_, store) = empty_store();

        let created = store
            .add_requirement(
                "acc-9",
                RequirementDraft {
                    name: "Req A".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(created.id.starts_with("req-"));
        assert_eq!(created.id.len(), 12);
        assert!(created.validation_checks.is_empty());
        assert!(created.verification_checks.is_empty());

        let updated = store
            .update_requirement(
                "acc-9",
                &created.id,
                RequirementUpdate {
                    name: Some("Req A2".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Req A2");
        assert!(updated
            .activity_log
            .iter()
            .any(|line| line.contains("changed name from \"Req A\" to \"Req A2\"")));

        store.delete_requirement(&created.id).await.unwrap();
        let missing = store.get_requirement(&created.id).await;
        assert!(matches!(
            missing,
            Err(ReqbaseError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_second_delete_is_not_found() {
        let (_, store) = empty_store();
        let created = store
            .add_requirement(
                "acc-1",
                RequirementDraft {
                    name: "Req".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.delete_requirement(&created.id).await.unwrap();
        let second = store.delete_requirement(&created.id).await;
        assert!(matches!(
            second,
            Err(ReqbaseError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_create_requires_name() {
        let (_, store) = empty_store();
        let result = store
            .add_requirement("acc-1", RequirementDraft::default())
            .await;
        assert!(matches!(
            result,
            Err(ReqbaseError::Validation(
                ValidationError::RequiredFieldMissing { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_update_resolves_reference_labels_at_write_time() {
        let (_, store) = empty_store();
        let functional = store
            .add_type(LookupDraft {
                name: "Functional".to_string(),
                color: "#336699".to_string(),
            })
            .await
            .unwrap();
        let req = store
            .add_requirement(
                "acc-1",
                RequirementDraft {
                    name: "Req".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let updated = store
            .update_requirement(
                "acc-1",
                &req.id,
                RequirementUpdate {
                    type_id: Some(functional.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated
            .activity_log
            .iter()
            .any(|line| line.contains("changed type from \"none\" to \"Functional\"")));
    }

    #[tokio::test]
    async fn test_log_actor_resolves_at_read_time() {
        let mut users = HashMap::new();
        users.insert("acc-7".to_string(), profile("acc-7", "Dana Q"));
        let (_, store) = store_with_users(users);

        let req = store
            .add_requirement(
                "acc-7",
                RequirementDraft {
                    name: "Req".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = store.get_requirement(&req.id).await.unwrap();
        assert!(fetched.activity_log[0].starts_with("Dana Q "));
        // The stored document keeps the raw marker.
        let raw = store
            .read_collection::<Vec<Requirement>>(REQUIREMENTS_KEY)
            .await
            .unwrap();
        assert!(raw[0].activity_log[0].starts_with("{{@acc-7@}} "));
    }

    #[tokio::test]
    async fn test_unknown_actor_falls_back_to_account_id() {
        let (_, store) = empty_store();
        let req = store
            .add_requirement(
                "acc-unknown",
                RequirementDraft {
                    name: "Req".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let fetched = store.get_requirement(&req.id).await.unwrap();
        assert!(fetched.activity_log[0].starts_with("acc-unknown "));
    }

    #[tokio::test]
    async fn test_no_op_update_appends_nothing() {
        let (_, store) = empty_store();
        let req = store
            .add_requirement(
                "acc-1",
                RequirementDraft {
                    name: "Req".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let updated = store
            .update_requirement(
                "acc-1",
                &req.id,
                RequirementUpdate {
                    name: Some("Req".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // Only the creation line.
        assert_eq!(updated.activity_log.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_prunes_join_table() {
        let (_, store) = empty_store();
        let keep = store
            .add_requirement(
                "acc-1",
                RequirementDraft {
                    name: "Keep".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let doomed = store
            .add_requirement(
                "acc-1",
                RequirementDraft {
                    name: "Doomed".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        store
            .assign_issue("10001", vec![keep.id.clone(), doomed.id.clone()])
            .await
            .unwrap();
        store
            .assign_issue("10002", vec![doomed.id.clone()])
            .await
            .unwrap();
        store
            .assign_issue("10003", vec![keep.id.clone()])
            .await
            .unwrap();

        store.delete_requirement(&doomed.id).await.unwrap();

        let links = store.issue_links().await.unwrap();
        assert_eq!(links["10001"], vec![keep.id.clone()]);
        assert!(links["10002"].is_empty());
        assert_eq!(links["10003"], vec![keep.id.clone()]);
    }

    #[tokio::test]
    async fn test_assign_issue_rejects_unknown_requirement() {
        let (_, store) = empty_store();
        let result = store
            .assign_issue("10001", vec!["req-00000000".to_string()])
            .await;
        assert!(matches!(
            result,
            Err(ReqbaseError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_issues_for_requirement_scans_links() {
        let (_, store) = empty_store();
        let req = store
            .add_requirement(
                "acc-1",
                RequirementDraft {
                    name: "Req".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .assign_issue("10001", vec![req.id.clone()])
            .await
            .unwrap();
        store.assign_issue("10002", vec![]).await.unwrap();

        let issues = store.issues_for_requirement(&req.id).await.unwrap();
        assert_eq!(issues, vec!["10001".to_string()]);
    }

    #[tokio::test]
    async fn test_mutation_refreshes_cache_entry() {
        let (backend, store) = empty_store();
        store.prime_cache().await.unwrap();

        let added = store
            .add_type(LookupDraft {
                name: "Functional".to_string(),
                color: "#fff".to_string(),
            })
            .await
            .unwrap();

        // Same-instance read reflects the write without another adapter round-trip.
        let listed = store.list_types().await.unwrap();
        assert_eq!(listed, vec![added]);
        assert_eq!(
            store.cache.state(TYPES_KEY).unwrap(),
            CacheEntryState::Populated
        );
        assert!(backend.contains_key(TYPES_KEY));
    }

    #[tokio::test]
    async fn test_lookup_update_returns_updated_record() {
        let (_, store) = empty_store();
        let stage = store
            .add_stage(LookupDraft {
                name: "Draft".to_string(),
                color: "#ccc".to_string(),
            })
            .await
            .unwrap();
        let updated = store
            .update_stage(
                &stage.id,
                LookupUpdate {
                    name: Some("In Review".to_string()),
                    color: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "In Review");
        assert_eq!(updated.color, "#ccc");
    }

    #[tokio::test]
    async fn test_checklist_crud() {
        let (_, store) = empty_store();
        let item = store.add_validation_item("Peer review").await.unwrap();
        assert!(item.id.starts_with("val-"));

        let renamed = store
            .update_validation_item(
                &item.id,
                ChecklistUpdate {
                    name: Some("Design review".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Design review");

        store.remove_validation_item(&item.id).await.unwrap();
        assert!(store.list_validation_items().await.unwrap().is_empty());
        let second = store.remove_validation_item(&item.id).await;
        assert!(matches!(
            second,
            Err(ReqbaseError::Storage(StorageError::NotFound { .. }))
        ));
    }
}
