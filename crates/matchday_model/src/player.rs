//! Players and team personnel.

use crate::ids::Identified;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A player in the coach's roster pool.
///
/// Players are independent entities: nothing they carry references another
/// entity type, so they are always written first in dependency order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Stable, caller-assigned ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Jersey number, free-form (kept as text; "00" is a valid number).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<String>,
    /// Free-text coaching notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Player {
    /// Creates a player with just an ID and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            jersey_number: None,
            notes: None,
            updated_at: None,
        }
    }

    /// Sets the last modification time.
    pub fn with_updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }
}

impl Identified for Player {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// A non-player member of the team staff (assistant coach, physio, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personnel {
    /// Stable, caller-assigned ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Role label, free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Personnel {
    /// Creates a personnel member with just an ID and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role: None,
            updated_at: None,
        }
    }
}

impl Identified for Personnel {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
