//! Error types for reqbase operations

use crate::records::RecordKind;
use thiserror::Error;

/// Validation errors raised before any storage write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {kind:?} with id {id}")]
    NotFound { kind: RecordKind, id: String },

    #[error("Write conflict on {key}: revision advanced past {expected}")]
    WriteConflict { key: String, expected: u64 },

    #[error("Backend error on {key}: {reason}")]
    Backend { key: String, reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Timed out after {waited_ms}ms waiting on {key}")]
    Timeout { key: String, waited_ms: u64 },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Snapshot engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("Version already exists: {key}")]
    DuplicateVersion { key: String },

    #[error("Version not found: {key}")]
    VersionNotFound { key: String },

    #[error("Corrupt snapshot payload: {reason}")]
    CorruptPayload { reason: String },

    #[error("Restore incomplete, keys left unswapped: {keys:?}")]
    RestoreIncomplete { keys: Vec<String> },
}

/// Issue-tracker client errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Tracker request to {endpoint} failed with status {status}: {message}")]
    RequestFailed {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Invalid tracker response: {reason}")]
    InvalidResponse { reason: String },

    #[error("Tracker request to {endpoint} timed out")]
    Timeout { endpoint: String },
}

/// Master error type for all reqbase errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReqbaseError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

/// Result type alias for reqbase operations.
pub type ReqbaseResult<T> = Result<T, ReqbaseError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::NotFound {
            kind: RecordKind::Requirement,
            id: "req-00000001".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Record not found"));
        assert!(msg.contains("Requirement"));
        assert!(msg.contains("req-00000001"));
    }

    #[test]
    fn test_storage_error_display_write_conflict() {
        let err = StorageError::WriteConflict {
            key: "user-requirements".to_string(),
            expected: 7,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Write conflict"));
        assert!(msg.contains("user-requirements"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_snapshot_error_display_restore_incomplete() {
        let err = SnapshotError::RestoreIncomplete {
            keys: vec!["user-types".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Restore incomplete"));
        assert!(msg.contains("user-types"));
    }

    #[test]
    fn test_tracker_error_display_request_failed() {
        let err = TrackerError::RequestFailed {
            endpoint: "issue/bulkfetch".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("issue/bulkfetch"));
        assert!(msg.contains("503"));
        assert!(msg.contains("unavailable"));
    }

    #[test]
    fn test_reqbase_error_from_variants() {
        let validation = ReqbaseError::from(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
        assert!(matches!(validation, ReqbaseError::Validation(_)));

        let storage = ReqbaseError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, ReqbaseError::Storage(_)));

        let snapshot = ReqbaseError::from(SnapshotError::VersionNotFound {
            key: "v1".to_string(),
        });
        assert!(matches!(snapshot, ReqbaseError::Snapshot(_)));

        let tracker = ReqbaseError::from(TrackerError::InvalidResponse {
            reason: "empty body".to_string(),
        });
        assert!(matches!(tracker, ReqbaseError::Tracker(_)));
    }
}
