//! Core record structures
//!
//! Wire names are camelCase to match the documents already persisted by
//! existing installations.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record kind discriminator. Drives id prefixes and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Requirement,
    Type,
    Stage,
    Status,
    Validation,
    Verification,
}

impl RecordKind {
    /// Three-character id prefix, derived from the kind name the same way
    /// for every kind: first three letters, lowercased.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Requirement => "req",
            Self::Type => "typ",
            Self::Stage => "sta",
            Self::Status => "sta",
            Self::Validation => "val",
            Self::Verification => "ver",
        }
    }
}

/// A tracked requirement.
///
/// `validation_checks`/`verification_checks` hold the ids of checklist items
/// currently ticked for this requirement. `activity_log` is append-only; see
/// the storage crate for the line format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub type_id: Option<String>,
    #[serde(default)]
    pub stage_id: Option<String>,
    #[serde(default)]
    pub status_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub validation_checks: Vec<String>,
    #[serde(default)]
    pub verification_checks: Vec<String>,
    #[serde(default)]
    pub activity_log: Vec<String>,
}

/// Fields accepted when creating a requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub type_id: Option<String>,
    #[serde(default)]
    pub stage_id: Option<String>,
    #[serde(default)]
    pub status_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
}

/// Update payload for requirements. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub type_id: Option<String>,
    #[serde(default)]
    pub stage_id: Option<String>,
    #[serde(default)]
    pub status_id: Option<String>,
    #[serde(default)]
    pub assignee_id: Option<String>,
    #[serde(default)]
    pub validation_checks: Option<Vec<String>>,
    #[serde(default)]
    pub verification_checks: Option<Vec<String>>,
}

/// A named, colored lookup record (type, stage, or status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupItem {
    pub id: String,
    pub name: String,
    pub color: String,
}

/// Fields accepted when creating a lookup record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupDraft {
    pub name: String,
    #[serde(default)]
    pub color: String,
}

/// Update payload for lookup records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// A checklist item (validation or verification).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub id: String,
    pub name: String,
}

/// Update payload for checklist items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistUpdate {
    #[serde(default)]
    pub name: Option<String>,
}

/// Join table: external issue id to the ordered requirement ids assigned to
/// it. A BTreeMap keeps serialization deterministic.
pub type IssueLinks = BTreeMap<String, Vec<String>>;

/// A stored snapshot of every tracked collection.
///
/// `data` is base64 text of the zlib-deflated JSON payload mapping each
/// logical key to its persisted value at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub key: String,
    pub description: String,
    pub created_at: Timestamp,
    pub data: String,
}

/// Listing projection of a version; the payload is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub key: String,
    pub description: String,
    pub created_at: Timestamp,
}

impl From<&VersionRecord> for VersionSummary {
    fn from(record: &VersionRecord) -> Self {
        Self {
            key: record.key.clone(),
            description: record.description.clone(),
            created_at: record.created_at,
        }
    }
}

/// Minimal user projection kept in the directory cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub account_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Issue metadata returned by the tracker for enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDetails {
    pub id: String,
    pub key: String,
    pub summary: String,
    pub status: String,
    pub priority: String,
    #[serde(default)]
    pub assignee: Option<UserProfile>,
    pub is_done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_wire_names_are_camel_case() {
        let req = Requirement {
            id: "req-00000001".to_string(),
            name: "Req A".to_string(),
            description: None,
            type_id: Some("typ-00000002".to_string()),
            stage_id: None,
            status_id: None,
            assignee_id: None,
            validation_checks: vec![],
            verification_checks: vec![],
            activity_log: vec![],
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("validationChecks").is_some());
        assert!(value.get("verificationChecks").is_some());
        assert!(value.get("typeId").is_some());
        assert!(value.get("type_id").is_none());
    }

    #[test]
    fn test_requirement_tolerates_sparse_documents() {
        // Documents written before the stage/status/log fields existed.
        let req: Requirement = serde_json::from_value(serde_json::json!({
            "id": "req-00000001",
            "name": "Req A",
        }))
        .unwrap();
        assert!(req.validation_checks.is_empty());
        assert!(req.activity_log.is_empty());
        assert_eq!(req.stage_id, None);
    }

    #[test]
    fn test_version_summary_drops_payload() {
        let record = VersionRecord {
            key: "v1".to_string(),
            description: "before cleanup".to_string(),
            created_at: chrono::Utc::now(),
            data: "eJxLzs8tKMnMSwcAD5cDLg==".to_string(),
        };
        let summary = VersionSummary::from(&record);
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("data").is_none());
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_record_kind_prefixes() {
        assert_eq!(RecordKind::Requirement.prefix(), "req");
        assert_eq!(RecordKind::Type.prefix(), "typ");
        // Stage and status share a prefix; collections are separate
        // namespaces, so ids never collide across them in practice.
        assert_eq!(RecordKind::Stage.prefix(), "sta");
        assert_eq!(RecordKind::Status.prefix(), "sta");
    }
}
