//! Reqbase Core - Record Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no storage or network logic.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

pub mod error;
pub mod keys;
pub mod records;

pub use error::{
    ReqbaseError, ReqbaseResult, SnapshotError, StorageError, TrackerError, ValidationError,
};
pub use records::{
    ChecklistItem, ChecklistUpdate, IssueDetails, IssueLinks, LookupDraft, LookupItem,
    LookupUpdate, RecordKind, Requirement, RequirementDraft, RequirementUpdate, UserProfile,
    VersionRecord, VersionSummary,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Format used for timestamps embedded in activity-log lines.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Render a timestamp the way activity-log lines carry it.
pub fn format_log_timestamp(ts: Timestamp) -> String {
    ts.format(LOG_TIMESTAMP_FORMAT).to_string()
}

/// Modulus keeping id suffixes at exactly eight decimal digits.
const ID_SUFFIX_SPAN: u64 = 100_000_000;

static LAST_ID_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Generate a record id of the form `<prefix>-<8 digits>`.
///
/// The suffix is derived from the millisecond clock (its last eight digits),
/// bumped past the previously issued suffix so ids minted within the same
/// millisecond still differ. Uniqueness across processes stays best-effort.
pub fn generate_record_id(kind: RecordKind) -> String {
    let now = (Utc::now().timestamp_millis().max(0) as u64) % ID_SUFFIX_SPAN;
    let mut last = LAST_ID_SUFFIX.load(Ordering::SeqCst);
    let suffix = loop {
        let next = if now > last {
            now
        } else {
            (last + 1) % ID_SUFFIX_SPAN
        };
        match LAST_ID_SUFFIX.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => break next,
            Err(observed) => last = observed,
        }
    };
    format!("{}-{:08}", kind.prefix(), suffix)
}

// ============================================================================
// TESTS
// ============================================================================
