//! Post-write verification engine.
//!
//! Runs after every upload/download pass, in both directions. Two
//! complementary checks, because either alone is insufficient:
//!
//! 1. **Count comparison**: the destination must hold at least the union
//!    of what it held before and what was written; a shortfall implies
//!    silent loss. Pre-existing destination data is an informational
//!    warning, not a failure.
//! 2. **Identity comparison**: every source entity ID must be present in
//!    the destination's resulting ID set. This catches the merge case
//!    counts miss: N new uploads succeed while N different pre-existing
//!    rows keep the totals looking right.
//!
//! Games additionally get a content check (embedded event count and
//! available-player count) to catch truncated or corrupted writes that
//! identity comparison alone would not see.
//!
//! Freshness merges use [`verify_hydration`] instead of
//! [`verify_transfer`]: the identity and content checks are restricted to
//! the written ledger, so destination records the merge deliberately kept
//! are never misreported as loss.

use crate::store::{export_snapshot, StoreAdapter};
use matchday_model::{DataSnapshot, EntityCounts, EntityKind, Game, Identified};
use std::collections::{BTreeMap, BTreeSet};

/// IDs successfully written to the destination during one transfer pass.
#[derive(Debug, Clone, Default)]
pub struct WrittenLedger {
    ids: BTreeMap<EntityKind, BTreeSet<String>>,
    counts: EntityCounts,
}

impl WrittenLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful keyed write.
    pub fn record(&mut self, kind: EntityKind, id: &str) {
        self.counts.add_one(kind);
        self.ids.entry(kind).or_default().insert(id.to_string());
    }

    /// Records a successful singleton-document write.
    pub fn record_singleton(&mut self, kind: EntityKind) {
        self.counts.add_one(kind);
    }

    /// Written counts, the shape the final report exposes.
    pub fn counts(&self) -> &EntityCounts {
        &self.counts
    }

    /// Written IDs for one kind.
    pub fn ids(&self, kind: EntityKind) -> Option<&BTreeSet<String>> {
        self.ids.get(&kind)
    }
}

/// One entity the destination should hold but does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntity {
    /// Entity category.
    pub kind: EntityKind,
    /// The missing ID.
    pub id: String,
}

/// Result of one verification pass.
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
    /// True when nothing blocking was found.
    pub passed: bool,
    /// Missing IDs of critical entity types.
    pub missing_critical: Vec<MissingEntity>,
    /// Missing IDs of non-critical types (re-derivable; warnings only).
    pub missing_noncritical: Vec<MissingEntity>,
    /// Game IDs whose embedded content differs between source and
    /// destination.
    pub content_mismatches: Vec<String>,
    /// Blocking findings, formatted for the final report.
    pub errors: Vec<String>,
    /// Informational findings.
    pub warnings: Vec<String>,
}

/// Verifies a completed transfer by identity, count and game content.
///
/// `source` is the sanitized snapshot the transfer attempted to copy;
/// `before` is the destination's contents captured before the first
/// write; `written` is what the transfer loop recorded as successfully
/// written. The destination is re-read here: verification trusts the
/// store, not the engine's own bookkeeping.
pub fn verify_transfer(
    source: &DataSnapshot,
    before: &DataSnapshot,
    written: &WrittenLedger,
    destination: &dyn StoreAdapter,
    content_mismatch_fatal: bool,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    let after = match export_snapshot(destination) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            report
                .errors
                .push(format!("verification read failed: {e}; retry the migration"));
            return report;
        }
    };

    if before.counts().total() > 0 {
        report.warnings.push(format!(
            "destination already held {} entities before the transfer (merged by id)",
            before.counts().total()
        ));
    }

    check_identity(
        EntityKind::Player,
        &source.players,
        &after.players,
        &mut report,
    );
    check_identity(
        EntityKind::Season,
        &source.seasons,
        &after.seasons,
        &mut report,
    );
    check_identity(
        EntityKind::Tournament,
        &source.tournaments,
        &after.tournaments,
        &mut report,
    );
    check_identity(EntityKind::Team, &source.teams, &after.teams, &mut report);
    check_identity(
        EntityKind::Personnel,
        &source.personnel,
        &after.personnel,
        &mut report,
    );
    check_identity(EntityKind::Game, &source.games, &after.games, &mut report);
    check_identity(
        EntityKind::Adjustment,
        &source.adjustments,
        &after.adjustments,
        &mut report,
    );

    // Rosters are keyed by owning team rather than their own ID.
    let after_roster_teams: BTreeSet<&str> =
        after.rosters.iter().map(|r| r.team_id.as_str()).collect();
    for roster in &source.rosters {
        if !after_roster_teams.contains(roster.team_id.as_str()) {
            report.missing_noncritical.push(MissingEntity {
                kind: EntityKind::Roster,
                id: roster.team_id.clone(),
            });
            report.warnings.push(format!(
                "roster for team {} is missing in the destination (re-derivable)",
                roster.team_id
            ));
        }
    }

    if source.warmup_plan.is_some() && after.warmup_plan.is_none() {
        report
            .warnings
            .push("warm-up plan document is missing in the destination".into());
    }
    if source.settings.is_some() && after.settings.is_none() {
        report
            .warnings
            .push("settings document is missing in the destination".into());
    }

    check_counts(before, written, &after.counts(), &mut report);
    check_game_content(source.games.iter(), &after, content_mismatch_fatal, &mut report);

    report.passed = report.errors.is_empty() && report.missing_critical.is_empty();
    report
}

/// Verifies a freshness-merge pass.
///
/// Only records the transfer actually wrote are checked: destination
/// records the merge deliberately kept (because the local copy was
/// fresher, or freshness was ambiguous) legitimately differ from the
/// source and must not be misreported as loss. Identity runs over the
/// written ledger's IDs, the count floor is unchanged, and the game
/// content check covers written games only.
pub fn verify_hydration(
    source: &DataSnapshot,
    before: &DataSnapshot,
    written: &WrittenLedger,
    destination: &dyn StoreAdapter,
    content_mismatch_fatal: bool,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    let after = match export_snapshot(destination) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            report
                .errors
                .push(format!("verification read failed: {e}; retry the migration"));
            return report;
        }
    };

    for kind in EntityKind::DEPENDENCY_ORDER {
        let Some(ids) = written.ids(kind) else {
            continue;
        };
        let present = ids_of(&after, kind);
        for id in ids {
            if present.contains(id.as_str()) {
                continue;
            }
            let missing = MissingEntity {
                kind,
                id: id.clone(),
            };
            if kind.is_critical() {
                report.errors.push(format!(
                    "{} {id} is missing in the destination after transfer",
                    kind.label()
                ));
                report.missing_critical.push(missing);
            } else {
                report.warnings.push(format!(
                    "{} {id} is missing in the destination after transfer",
                    kind.label()
                ));
                report.missing_noncritical.push(missing);
            }
        }
    }

    check_counts(before, written, &after.counts(), &mut report);

    let written_games: BTreeSet<&str> = written
        .ids(EntityKind::Game)
        .map(|ids| ids.iter().map(String::as_str).collect())
        .unwrap_or_default();
    check_game_content(
        source
            .games
            .iter()
            .filter(|g| written_games.contains(g.id.as_str())),
        &after,
        content_mismatch_fatal,
        &mut report,
    );

    report.passed = report.errors.is_empty() && report.missing_critical.is_empty();
    report
}

fn ids_of(snapshot: &DataSnapshot, kind: EntityKind) -> BTreeSet<&str> {
    match kind {
        EntityKind::Player => snapshot.player_ids(),
        EntityKind::Season => snapshot.season_ids(),
        EntityKind::Tournament => snapshot.tournament_ids(),
        EntityKind::Team => snapshot.team_ids(),
        EntityKind::Roster => snapshot.rosters.iter().map(|r| r.team_id.as_str()).collect(),
        EntityKind::Personnel => snapshot.personnel.iter().map(|p| p.id.as_str()).collect(),
        EntityKind::Game => snapshot.games.iter().map(|g| g.id.as_str()).collect(),
        EntityKind::Adjustment => snapshot.adjustments.iter().map(|a| a.id.as_str()).collect(),
        EntityKind::WarmupPlan | EntityKind::Settings => BTreeSet::new(),
    }
}

fn check_identity<T: Identified>(
    kind: EntityKind,
    source: &[T],
    after: &[T],
    report: &mut VerificationReport,
) {
    let after_ids: BTreeSet<&str> = after.iter().map(|e| e.id()).collect();
    for entity in source {
        if after_ids.contains(entity.id()) {
            continue;
        }
        let missing = MissingEntity {
            kind,
            id: entity.id().to_string(),
        };
        if kind.is_critical() {
            report.errors.push(format!(
                "{} {} is missing in the destination after transfer",
                kind.label(),
                entity.id()
            ));
            report.missing_critical.push(missing);
        } else {
            report.warnings.push(format!(
                "{} {} is missing in the destination after transfer",
                kind.label(),
                entity.id()
            ));
            report.missing_noncritical.push(missing);
        }
    }
}

fn check_counts(
    before: &DataSnapshot,
    written: &WrittenLedger,
    after: &EntityCounts,
    report: &mut VerificationReport,
) {
    for kind in EntityKind::DEPENDENCY_ORDER {
        let expected = expected_floor(before, written, kind);
        if after.get(kind) < expected {
            report.errors.push(format!(
                "destination holds {} {} but at least {expected} were expected; \
                 a write was silently lost",
                after.get(kind),
                kind.label()
            ));
        }
    }
}

/// The minimum number of entities the destination must hold afterwards:
/// the union of what it held before and what was successfully written.
/// Upserts never shrink a store, so falling below this is silent loss.
fn expected_floor(before: &DataSnapshot, written: &WrittenLedger, kind: EntityKind) -> usize {
    let empty = BTreeSet::new();
    let written_ids = written.ids(kind).unwrap_or(&empty);
    let union = |before_ids: BTreeSet<&str>| {
        before_ids
            .into_iter()
            .map(str::to_string)
            .chain(written_ids.iter().cloned())
            .collect::<BTreeSet<String>>()
            .len()
    };
    match kind {
        EntityKind::Player => union(before.player_ids()),
        EntityKind::Season => union(before.season_ids()),
        EntityKind::Tournament => union(before.tournament_ids()),
        EntityKind::Team => union(before.team_ids()),
        EntityKind::Roster => union(before.rosters.iter().map(|r| r.team_id.as_str()).collect()),
        EntityKind::Personnel => union(before.personnel.iter().map(|p| p.id.as_str()).collect()),
        EntityKind::Game => union(before.games.iter().map(|g| g.id.as_str()).collect()),
        EntityKind::Adjustment => {
            union(before.adjustments.iter().map(|a| a.id.as_str()).collect())
        }
        EntityKind::WarmupPlan => {
            usize::from(before.warmup_plan.is_some() || written.counts().warmup_plan)
        }
        EntityKind::Settings => {
            usize::from(before.settings.is_some() || written.counts().settings)
        }
    }
}

fn check_game_content<'a>(
    source_games: impl Iterator<Item = &'a Game>,
    after: &DataSnapshot,
    fatal: bool,
    report: &mut VerificationReport,
) {
    let after_games: BTreeMap<&str, (usize, usize)> = after
        .games
        .iter()
        .map(|g| (g.id.as_str(), (g.events.len(), g.available_players.len())))
        .collect();

    for game in source_games {
        let Some(&(events, players)) = after_games.get(game.id.as_str()) else {
            continue; // already reported by the identity check
        };
        if events != game.events.len() || players != game.available_players.len() {
            report.content_mismatches.push(game.id.clone());
            let finding = format!(
                "game {} content differs in the destination \
                 (events {} vs {}, players {} vs {}); the write may be truncated",
                game.id,
                game.events.len(),
                events,
                game.available_players.len(),
                players
            );
            if fatal {
                report.errors.push(finding);
            } else {
                report.warnings.push(finding);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use matchday_model::{Game, GameEvent, EventKind, Player, PlayerSnapshot};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 12).unwrap()
    }

    fn players(ids: &[&str]) -> Vec<Player> {
        ids.iter().map(|id| Player::new(*id, "P")).collect()
    }

    fn opened_with(snapshot: &DataSnapshot) -> MemoryStore {
        let store = MemoryStore::from_snapshot(snapshot);
        store.initialize().unwrap();
        store
    }

    #[test]
    fn passes_when_everything_arrived() {
        let source = DataSnapshot {
            players: players(&["p1", "p2"]),
            ..Default::default()
        };
        let mut written = WrittenLedger::new();
        written.record(EntityKind::Player, "p1");
        written.record(EntityKind::Player, "p2");
        let destination = opened_with(&source);

        let report = verify_transfer(
            &source,
            &DataSnapshot::default(),
            &written,
            &destination,
            true,
        );
        assert!(report.passed, "errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn undercount_caught_by_identity_not_counts() {
        // Destination pre-holds 10 entities with disjoint IDs; only 5 of
        // 10 new uploads succeeded. Naive count comparison (10 + 5 = 15)
        // would pass; identity must fail with exactly the 5 missing IDs.
        let pre: Vec<&str> = vec!["d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7", "d8", "d9"];
        let before = DataSnapshot {
            players: players(&pre),
            ..Default::default()
        };
        let source_ids: Vec<&str> =
            vec!["n0", "n1", "n2", "n3", "n4", "n5", "n6", "n7", "n8", "n9"];
        let source = DataSnapshot {
            players: players(&source_ids),
            ..Default::default()
        };

        // Destination = pre-existing + the 5 that made it.
        let mut dest_contents = before.clone();
        dest_contents.players.extend(players(&source_ids[..5]));
        let destination = opened_with(&dest_contents);

        let mut written = WrittenLedger::new();
        for id in &source_ids[..5] {
            written.record(EntityKind::Player, id);
        }

        let report = verify_transfer(&source, &before, &written, &destination, true);
        assert!(!report.passed);
        assert_eq!(report.missing_critical.len(), 5);
        let missing: Vec<&str> = report
            .missing_critical
            .iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(missing, &source_ids[5..]);
        // Pre-existing data is a warning, not an error.
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("already held")));
    }

    #[test]
    fn count_shortfall_is_an_error() {
        // Written ledger claims p1 was written, but the destination lost it.
        let source = DataSnapshot {
            players: players(&["p1"]),
            ..Default::default()
        };
        let mut written = WrittenLedger::new();
        written.record(EntityKind::Player, "p1");
        let destination = opened_with(&DataSnapshot::default());

        let report = verify_transfer(
            &source,
            &DataSnapshot::default(),
            &written,
            &destination,
            true,
        );
        assert!(!report.passed);
        assert!(report.errors.iter().any(|e| e.contains("silently lost")));
    }

    #[test]
    fn game_content_mismatch_fatal_and_lenient() {
        let mut source_game = Game::new("g1", "A", "B", date());
        source_game.events.push(GameEvent {
            id: "e1".into(),
            kind: EventKind::Goal,
            time_seconds: 10,
            scorer_id: None,
            assister_id: None,
        });
        source_game.available_players.push(PlayerSnapshot {
            id: "p1".into(),
            name: "Alex".into(),
        });
        let source = DataSnapshot {
            games: vec![source_game.clone()],
            ..Default::default()
        };

        // Destination copy lost its event list.
        let mut truncated = source_game;
        truncated.events.clear();
        let destination = opened_with(&DataSnapshot {
            games: vec![truncated],
            ..Default::default()
        });
        let mut written = WrittenLedger::new();
        written.record(EntityKind::Game, "g1");

        let fatal = verify_transfer(
            &source,
            &DataSnapshot::default(),
            &written,
            &destination,
            true,
        );
        assert!(!fatal.passed);
        assert_eq!(fatal.content_mismatches, vec!["g1"]);

        let lenient = verify_transfer(
            &source,
            &DataSnapshot::default(),
            &written,
            &destination,
            false,
        );
        assert!(lenient.passed);
        assert_eq!(lenient.content_mismatches, vec!["g1"]);
        assert!(lenient.warnings.iter().any(|w| w.contains("truncated")));
    }

    #[test]
    fn missing_roster_is_warning_only() {
        let source = DataSnapshot {
            teams: vec![matchday_model::Team::new("t1", "U10")],
            rosters: vec![matchday_model::TeamRoster::new("t1", vec![])],
            ..Default::default()
        };
        let destination = opened_with(&DataSnapshot {
            teams: source.teams.clone(),
            ..Default::default()
        });
        let mut written = WrittenLedger::new();
        written.record(EntityKind::Team, "t1");

        let report = verify_transfer(
            &source,
            &DataSnapshot::default(),
            &written,
            &destination,
            true,
        );
        assert!(report.passed);
        assert_eq!(report.missing_noncritical.len(), 1);
        assert!(report.warnings.iter().any(|w| w.contains("roster")));
    }

    #[test]
    fn ledger_tracks_ids_per_kind() {
        let mut ledger = WrittenLedger::new();
        ledger.record(EntityKind::Player, "p1");
        ledger.record(EntityKind::Player, "p2");
        ledger.record(EntityKind::Game, "g1");
        ledger.record_singleton(EntityKind::Settings);

        assert_eq!(ledger.counts().players, 2);
        assert_eq!(ledger.counts().games, 1);
        assert!(ledger.counts().settings);
        assert!(ledger.ids(EntityKind::Player).unwrap().contains("p1"));
        assert!(ledger.ids(EntityKind::Season).is_none());
        assert!(ledger.ids(EntityKind::Settings).is_none());
    }

    #[test]
    fn hydration_check_catches_dropped_writes() {
        // The ledger claims p1 was written, but the destination never
        // stored it.
        let source = DataSnapshot {
            players: players(&["p1"]),
            ..Default::default()
        };
        let mut written = WrittenLedger::new();
        written.record(EntityKind::Player, "p1");
        let destination = opened_with(&DataSnapshot::default());

        let report = verify_hydration(
            &source,
            &DataSnapshot::default(),
            &written,
            &destination,
            true,
        );
        assert!(!report.passed);
        assert_eq!(report.missing_critical.len(), 1);
        assert_eq!(report.missing_critical[0].id, "p1");
    }

    #[test]
    fn hydration_check_ignores_records_the_merge_kept() {
        // The cloud copy of g1 has an event the local copy lacks, but g1
        // was skipped as fresher locally (not in the ledger): the content
        // check must not flag it.
        let mut cloud_game = Game::new("g1", "A", "B", date());
        cloud_game.events.push(GameEvent {
            id: "e1".into(),
            kind: EventKind::Goal,
            time_seconds: 10,
            scorer_id: None,
            assister_id: None,
        });
        let source = DataSnapshot {
            players: players(&["p1"]),
            games: vec![cloud_game],
            ..Default::default()
        };
        let local_before = DataSnapshot {
            games: vec![Game::new("g1", "A", "B", date())],
            ..Default::default()
        };

        let mut after = local_before.clone();
        after.players = players(&["p1"]);
        let destination = opened_with(&after);

        let mut written = WrittenLedger::new();
        written.record(EntityKind::Player, "p1");

        let report = verify_hydration(&source, &local_before, &written, &destination, true);
        assert!(report.passed, "errors: {:?}", report.errors);
        assert!(report.content_mismatches.is_empty());
    }

    #[test]
    fn read_failure_fails_verification() {
        let destination = opened_with(&DataSnapshot::default());
        destination.set_fail_reads(true);
        let report = verify_transfer(
            &DataSnapshot::default(),
            &DataSnapshot::default(),
            &WrittenLedger::new(),
            &destination,
            true,
        );
        assert!(!report.passed);
        assert!(report.errors[0].contains("verification read failed"));
    }
}
