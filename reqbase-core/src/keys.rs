//! Logical storage keys.
//!
//! Every collection persists under exactly one key in the document store.
//! Key strings match the persisted data of existing installations, so they
//! must not change.

/// Requirements collection.
pub const REQUIREMENTS_KEY: &str = "user-requirements";

/// Requirement types collection.
pub const TYPES_KEY: &str = "user-types";

/// Stages collection.
pub const STAGES_KEY: &str = "user-stages";

/// Statuses collection.
pub const STATUS_KEY: &str = "user-status";

/// Validation checklist collection.
pub const VALIDATION_CHECKLIST_KEY: &str = "validation-checklist";

/// Verification checklist collection.
pub const VERIFICATION_CHECKLIST_KEY: &str = "verification-checklist";

/// Issue-to-requirement join table.
pub const ISSUE_JOIN_KEY: &str = "requirement-issue-join";

/// Version catalog. Never part of its own snapshot payload.
pub const VERSIONS_KEY: &str = "versions";

/// Keys captured by a snapshot bundle.
pub const SNAPSHOT_KEYS: [&str; 7] = [
    REQUIREMENTS_KEY,
    TYPES_KEY,
    STAGES_KEY,
    STATUS_KEY,
    VALIDATION_CHECKLIST_KEY,
    VERIFICATION_CHECKLIST_KEY,
    ISSUE_JOIN_KEY,
];

/// Collections mirrored by the cache layer by default. Requirements and the
/// join table are read straight from the adapter.
pub const DEFAULT_CACHED_KEYS: [&str; 5] = [
    TYPES_KEY,
    STAGES_KEY,
    STATUS_KEY,
    VALIDATION_CHECKLIST_KEY,
    VERIFICATION_CHECKLIST_KEY,
];
