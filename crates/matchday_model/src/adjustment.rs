//! Manual player stat adjustments.

use crate::ids::Identified;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A manual correction to a player's aggregate stats, used when games
/// were tracked outside the app or recorded incorrectly.
///
/// Depends on its player; an adjustment whose `player_id` does not resolve
/// in the same snapshot cannot be repaired (the reference is required) and
/// is quarantined by the sanitizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatAdjustment {
    /// Stable, caller-assigned ID.
    pub id: String,
    /// The player this adjustment applies to. Required.
    pub player_id: String,
    /// Season scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_id: Option<String>,
    /// Tournament scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    /// Games played delta.
    #[serde(default)]
    pub games_delta: i32,
    /// Goals delta.
    #[serde(default)]
    pub goals_delta: i32,
    /// Assists delta.
    #[serde(default)]
    pub assists_delta: i32,
    /// Free-text reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PlayerStatAdjustment {
    /// Creates a zero adjustment for a player.
    pub fn new(id: impl Into<String>, player_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            player_id: player_id.into(),
            season_id: None,
            tournament_id: None,
            games_delta: 0,
            goals_delta: 0,
            assists_delta: 0,
            note: None,
            updated_at: None,
        }
    }
}

impl Identified for PlayerStatAdjustment {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}
