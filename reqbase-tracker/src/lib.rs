//! Reqbase Tracker - Issue-Tracker Client and Enrichment
//!
//! Batch-lookup access to the external issue tracker plus the read-side
//! joins built on it: linked-issue listings, progress percentages, and the
//! dashboard projection. Tracker data enriches stored collections and is
//! never correctness-critical state.

pub mod client;
pub mod enrich;
pub mod mock;

pub use client::{HttpIssueTracker, IssueTracker, TrackerDirectory, DONE_STATUS_NAMES};
pub use enrich::{DashboardIssue, DashboardRow, Enrichment};
pub use mock::MockIssueTracker;
