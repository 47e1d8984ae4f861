//! Full-store snapshots and entity-category metadata.

use crate::{
    AppSettings, Game, ModelResult, Personnel, Player, PlayerStatAdjustment, Season, Team,
    TeamRoster, Tournament, WarmupPlan,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The entity categories the migration engine moves, in no particular
/// order. Use [`EntityKind::DEPENDENCY_ORDER`] when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// Players.
    Player,
    /// Seasons.
    Season,
    /// Tournaments.
    Tournament,
    /// Teams.
    Team,
    /// Per-team rosters.
    Roster,
    /// Team personnel.
    Personnel,
    /// Games.
    Game,
    /// Player stat adjustments.
    Adjustment,
    /// The singleton warm-up plan document.
    WarmupPlan,
    /// The singleton settings document.
    Settings,
}

impl EntityKind {
    /// Write order for migration: later kinds may reference earlier ones
    /// by ID, so upserting in this order means a foreign key always
    /// resolves against already-written rows.
    pub const DEPENDENCY_ORDER: [EntityKind; 10] = [
        EntityKind::Player,
        EntityKind::Season,
        EntityKind::Tournament,
        EntityKind::Team,
        EntityKind::Roster,
        EntityKind::Personnel,
        EntityKind::Game,
        EntityKind::Adjustment,
        EntityKind::WarmupPlan,
        EntityKind::Settings,
    ];

    /// Whether a write failure for this kind blocks overall migration
    /// success. Non-critical kinds are cheaply re-derivable or cosmetic
    /// and degrade to warnings.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            EntityKind::Player
                | EntityKind::Season
                | EntityKind::Tournament
                | EntityKind::Team
                | EntityKind::Personnel
                | EntityKind::Game
        )
    }

    /// Human-readable plural label for progress and report messages.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Player => "players",
            EntityKind::Season => "seasons",
            EntityKind::Tournament => "tournaments",
            EntityKind::Team => "teams",
            EntityKind::Roster => "team rosters",
            EntityKind::Personnel => "personnel",
            EntityKind::Game => "games",
            EntityKind::Adjustment => "stat adjustments",
            EntityKind::WarmupPlan => "warm-up plan",
            EntityKind::Settings => "settings",
        }
    }
}

/// Per-entity-type counts, used for source summaries, migration reports
/// and hydration written/skipped tallies. Singleton documents count as
/// booleans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCounts {
    /// Number of players.
    pub players: usize,
    /// Number of seasons.
    pub seasons: usize,
    /// Number of tournaments.
    pub tournaments: usize,
    /// Number of teams.
    pub teams: usize,
    /// Number of team rosters.
    pub rosters: usize,
    /// Number of personnel members.
    pub personnel: usize,
    /// Number of games.
    pub games: usize,
    /// Number of stat adjustments.
    pub adjustments: usize,
    /// Whether the warm-up plan document is present.
    pub warmup_plan: bool,
    /// Whether the settings document is present.
    pub settings: bool,
}

impl EntityCounts {
    /// Total number of entities, counting each singleton document as one.
    pub fn total(&self) -> usize {
        self.players
            + self.seasons
            + self.tournaments
            + self.teams
            + self.rosters
            + self.personnel
            + self.games
            + self.adjustments
            + usize::from(self.warmup_plan)
            + usize::from(self.settings)
    }

    /// Returns true if nothing is present at all.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Count for one kind; singleton documents report 0 or 1.
    pub fn get(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Player => self.players,
            EntityKind::Season => self.seasons,
            EntityKind::Tournament => self.tournaments,
            EntityKind::Team => self.teams,
            EntityKind::Roster => self.rosters,
            EntityKind::Personnel => self.personnel,
            EntityKind::Game => self.games,
            EntityKind::Adjustment => self.adjustments,
            EntityKind::WarmupPlan => usize::from(self.warmup_plan),
            EntityKind::Settings => usize::from(self.settings),
        }
    }

    /// Records one more entity of the given kind.
    pub fn add_one(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Player => self.players += 1,
            EntityKind::Season => self.seasons += 1,
            EntityKind::Tournament => self.tournaments += 1,
            EntityKind::Team => self.teams += 1,
            EntityKind::Roster => self.rosters += 1,
            EntityKind::Personnel => self.personnel += 1,
            EntityKind::Game => self.games += 1,
            EntityKind::Adjustment => self.adjustments += 1,
            EntityKind::WarmupPlan => self.warmup_plan = true,
            EntityKind::Settings => self.settings = true,
        }
    }
}

/// A read-only export of one store's entire contents.
///
/// Snapshots are taken before any destination write and are the unit the
/// sanitizer and the verification engine operate on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    /// All players.
    pub players: Vec<Player>,
    /// All seasons.
    pub seasons: Vec<Season>,
    /// All tournaments.
    pub tournaments: Vec<Tournament>,
    /// All teams, including soft-deleted ones.
    pub teams: Vec<Team>,
    /// All team rosters.
    pub rosters: Vec<TeamRoster>,
    /// All personnel.
    pub personnel: Vec<Personnel>,
    /// All games.
    pub games: Vec<Game>,
    /// All stat adjustments.
    pub adjustments: Vec<PlayerStatAdjustment>,
    /// The warm-up plan, if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warmup_plan: Option<WarmupPlan>,
    /// The settings document, if one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<AppSettings>,
}

impl DataSnapshot {
    /// Per-type counts for this snapshot.
    pub fn counts(&self) -> EntityCounts {
        EntityCounts {
            players: self.players.len(),
            seasons: self.seasons.len(),
            tournaments: self.tournaments.len(),
            teams: self.teams.len(),
            rosters: self.rosters.len(),
            personnel: self.personnel.len(),
            games: self.games.len(),
            adjustments: self.adjustments.len(),
            warmup_plan: self.warmup_plan.is_some(),
            settings: self.settings.is_some(),
        }
    }

    /// Returns true if the snapshot holds no data at all.
    pub fn is_empty(&self) -> bool {
        self.counts().is_empty()
    }

    /// IDs of all players in this snapshot.
    pub fn player_ids(&self) -> BTreeSet<&str> {
        self.players.iter().map(|p| p.id.as_str()).collect()
    }

    /// IDs of all seasons in this snapshot.
    pub fn season_ids(&self) -> BTreeSet<&str> {
        self.seasons.iter().map(|s| s.id.as_str()).collect()
    }

    /// IDs of all tournaments in this snapshot.
    pub fn tournament_ids(&self) -> BTreeSet<&str> {
        self.tournaments.iter().map(|t| t.id.as_str()).collect()
    }

    /// IDs of all teams in this snapshot.
    pub fn team_ids(&self) -> BTreeSet<&str> {
        self.teams.iter().map(|t| t.id.as_str()).collect()
    }

    /// Canonical JSON form, used to compare store contents byte-for-byte
    /// (the no-source-mutation guarantee is checked this way).
    pub fn canonical_json(&self) -> ModelResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}
