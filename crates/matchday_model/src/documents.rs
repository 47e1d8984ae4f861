//! Singleton, unkeyed documents: the warm-up plan and app settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step of the warm-up plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupStep {
    /// What to do.
    pub label: String,
    /// How long, in minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_min: Option<u32>,
}

/// The coach's warm-up plan. One per account, no ID.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmupPlan {
    /// Ordered warm-up steps.
    #[serde(default)]
    pub steps: Vec<WarmupStep>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Which storage backend the application reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    /// Embedded local-first store: single writer, always available offline.
    Local,
    /// Cloud relational store: multi-device, network-dependent.
    Cloud,
}

/// Application settings. One per account, no ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// UI language code.
    pub language: String,
    /// Default team name used when creating new games.
    pub default_team_name: String,
    /// Whether automatic local backups are enabled.
    #[serde(default)]
    pub auto_backup: bool,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            language: "en".into(),
            default_team_name: "Team".into(),
            auto_backup: false,
            updated_at: None,
        }
    }
}
