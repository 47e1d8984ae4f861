//! Final result types for the public operations.

use matchday_model::EntityCounts;
use serde::{Deserialize, Serialize};

/// Outcome of a forward or reverse migration.
///
/// Clone is deliberate: concurrent callers that joined an in-flight
/// operation receive a clone of the same report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    /// True when there were zero critical failures and verification
    /// passed. Warnings never block success.
    pub success: bool,
    /// Entities successfully written to the destination.
    pub counts: EntityCounts,
    /// Blocking failures, with actionable text.
    pub errors: Vec<String>,
    /// Non-blocking findings (orphan repairs, pre-existing destination
    /// data, skipped non-critical entities, degraded cleanup).
    pub warnings: Vec<String>,
    /// Whether the cloud copy was cleared (replace pre-clear, or
    /// delete-source cleanup after a verified copy).
    pub destination_cleaned: bool,
}

impl MigrationReport {
    /// A failed report carrying a single error.
    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

/// Outcome of a hydration pass.
///
/// Written and skipped are tallied separately so a caller can distinguish
/// "everything was already fresh" from "nothing succeeded".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationReport {
    /// True when there were zero critical failures and every written
    /// record verified present in the local store.
    pub success: bool,
    /// Entities written to the local store.
    pub written: EntityCounts,
    /// Entities left untouched because the local copy was at least as
    /// fresh (or freshness was ambiguous).
    pub skipped: EntityCounts,
    /// Blocking failures.
    pub errors: Vec<String>,
    /// Non-blocking findings.
    pub warnings: Vec<String>,
}

impl HydrationReport {
    /// A failed report carrying a single error.
    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

/// Result of asking whether the source store has any data, without ever
/// raising: a failed check is itself data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDataCheck {
    /// True if at least one entity or singleton document exists.
    pub has_data: bool,
    /// True if the check itself could not be completed.
    pub check_failed: bool,
    /// Error text when `check_failed` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
