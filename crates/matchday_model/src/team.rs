//! Teams and their rosters.

use crate::ids::Identified;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A team the coach manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    /// Stable, caller-assigned ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Season this team is bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_id: Option<String>,
    /// Tournament this team is bound to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    /// Soft-delete marker; deleted teams are still exported so the copy
    /// is complete.
    #[serde(default)]
    pub deleted: bool,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Team {
    /// Creates a team with just an ID and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            season_id: None,
            tournament_id: None,
            deleted: false,
            updated_at: None,
        }
    }

    /// Binds the team to a season.
    pub fn with_season(mut self, season_id: impl Into<String>) -> Self {
        self.season_id = Some(season_id.into());
        self
    }

    /// Binds the team to a tournament.
    pub fn with_tournament(mut self, tournament_id: impl Into<String>) -> Self {
        self.tournament_id = Some(tournament_id.into());
        self
    }
}

impl Identified for Team {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// A per-team ordered list of player references.
///
/// Rosters are owned by their team and carry no global identity of their
/// own; they are addressed by `team_id` and re-derivable from the team's
/// player pool, which is why their loss is classified non-critical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRoster {
    /// Owning team.
    pub team_id: String,
    /// Ordered player IDs; order is meaningful (field display order).
    pub player_ids: Vec<String>,
}

impl TeamRoster {
    /// Creates a roster for a team.
    pub fn new(team_id: impl Into<String>, player_ids: Vec<String>) -> Self {
        Self {
            team_id: team_id.into(),
            player_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_defaults() {
        let team = Team::new("t1", "Under 10s");
        assert!(!team.deleted);
        assert!(team.season_id.is_none());

        let json = serde_json::to_value(&team).unwrap();
        assert_eq!(json["name"], "Under 10s");
        // deleted serializes even when false (explicit soft-delete marker).
        assert_eq!(json["deleted"], false);
    }

    #[test]
    fn roster_preserves_order() {
        let roster = TeamRoster::new("t1", vec!["p3".into(), "p1".into(), "p2".into()]);
        let json = serde_json::to_string(&roster).unwrap();
        let back: TeamRoster = serde_json::from_str(&json).unwrap();
        assert_eq!(back.player_ids, vec!["p3", "p1", "p2"]);
    }
}
