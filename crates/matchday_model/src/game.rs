//! Games, the largest aggregate entity.
//!
//! A game embeds its event list and its available-player list as
//! denormalized snapshots. They are copies taken at game time, not live
//! references: a later rename of a player must not rewrite history.

use crate::ids::Identified;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a game.
///
/// Unrecognized values decode as [`GameStatus::Unknown`] so a malformed
/// source record survives the export and reaches the sanitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GameStatus {
    /// Game has not kicked off.
    NotStarted,
    /// Game is underway.
    InProgress,
    /// Game has finished.
    Finished,
    /// Source carried a value outside the known set.
    #[serde(other)]
    Unknown,
}

impl Default for GameStatus {
    fn default() -> Self {
        GameStatus::NotStarted
    }
}

/// Whether the coach's team played at home or away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HomeAway {
    /// Home fixture.
    Home,
    /// Away fixture.
    Away,
    /// Source carried a value outside the known set.
    #[serde(other)]
    Unknown,
}

impl Default for HomeAway {
    fn default() -> Self {
        HomeAway::Home
    }
}

/// Kind of an in-game event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    /// Goal scored by the coach's team.
    Goal,
    /// Goal scored by the opponent.
    OpponentGoal,
    /// Substitution.
    Substitution,
    /// Period end marker.
    PeriodEnd,
    /// Source carried a value outside the known set.
    #[serde(other)]
    Unknown,
}

/// A single in-game event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    /// Event ID, unique within the game.
    pub id: String,
    /// What happened.
    pub kind: EventKind,
    /// Seconds from kickoff.
    pub time_seconds: u32,
    /// Scorer, as recorded at game time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scorer_id: Option<String>,
    /// Assister, as recorded at game time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assister_id: Option<String>,
}

/// Denormalized player snapshot embedded in a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Player ID at the time the snapshot was taken.
    pub id: String,
    /// Player name at the time the snapshot was taken.
    pub name: String,
}

/// A recorded game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    /// Stable, caller-assigned ID.
    pub id: String,
    /// Name of the coach's team as entered for this game.
    pub team_name: String,
    /// Opponent name as entered for this game.
    pub opponent_name: String,
    /// Game date. A game without a parseable date cannot be repaired and
    /// is quarantined by the sanitizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Goals for.
    pub home_score: u32,
    /// Goals against.
    pub away_score: u32,
    /// Number of periods; the application supports 1 or 2.
    pub period_count: u32,
    /// Minutes per period. Signed because malformed sources have carried
    /// zero and negative values; the sanitizer defaults those.
    pub period_duration_min: i32,
    /// Lifecycle status.
    #[serde(default)]
    pub status: GameStatus,
    /// Home/away marker.
    #[serde(default)]
    pub home_or_away: HomeAway,
    /// Season reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_id: Option<String>,
    /// Tournament reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    /// Team reference, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// Free-text game notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Embedded event list.
    #[serde(default)]
    pub events: Vec<GameEvent>,
    /// Embedded available-player list.
    #[serde(default)]
    pub available_players: Vec<PlayerSnapshot>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Game {
    /// Creates a game with the required display fields and sane defaults.
    pub fn new(
        id: impl Into<String>,
        team_name: impl Into<String>,
        opponent_name: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            team_name: team_name.into(),
            opponent_name: opponent_name.into(),
            date: Some(date),
            home_score: 0,
            away_score: 0,
            period_count: 2,
            period_duration_min: 10,
            status: GameStatus::NotStarted,
            home_or_away: HomeAway::Home,
            season_id: None,
            tournament_id: None,
            team_id: None,
            notes: None,
            events: Vec::new(),
            available_players: Vec::new(),
            updated_at: None,
        }
    }
}

impl Identified for Game {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 12).unwrap()
    }

    #[test]
    fn unknown_status_decodes_leniently() {
        let json = r#"{"id":"g1","teamName":"A","opponentName":"B",
            "homeScore":0,"awayScore":0,"periodCount":2,
            "periodDurationMin":10,"status":"paused","homeOrAway":"neutral"}"#;
        let game: Game = serde_json::from_str(json).unwrap();
        assert_eq!(game.status, GameStatus::Unknown);
        assert_eq!(game.home_or_away, HomeAway::Unknown);
        assert!(game.date.is_none());
    }

    #[test]
    fn game_roundtrip_with_events() {
        let mut game = Game::new("g1", "Under 10s", "Rovers", sample_date());
        game.events.push(GameEvent {
            id: "e1".into(),
            kind: EventKind::Goal,
            time_seconds: 312,
            scorer_id: Some("p1".into()),
            assister_id: None,
        });
        game.available_players.push(PlayerSnapshot {
            id: "p1".into(),
            name: "Alex".into(),
        });

        let json = serde_json::to_string(&game).unwrap();
        let back: Game = serde_json::from_str(&json).unwrap();
        assert_eq!(back, game);
        assert_eq!(back.events.len(), 1);
        assert_eq!(back.available_players.len(), 1);
    }
}
