//! The shared dependency-ordered transfer loop.
//!
//! Forward and reverse migration, and hydration, all copy a sanitized
//! snapshot into a destination adapter. The loop writes entity types in
//! [`EntityKind::DEPENDENCY_ORDER`] so a foreign key always resolves
//! against already-written rows, clears any reference whose target failed
//! to write (a partial failure must never leave a dangling reference),
//! and periodically re-validates the session during the long game loop.
//!
//! All writes are idempotent upserts: nothing here needs rollback, a
//! retry of the whole operation simply overwrites by ID.

use crate::auth::{AuthService, Session};
use crate::config::MigrationConfig;
use crate::progress::{MigrationStage, ProgressEvent, Reporter};
use crate::store::StoreAdapter;
use crate::verify::WrittenLedger;
use chrono::{DateTime, Duration, Utc};
use matchday_model::{DataSnapshot, EntityCounts, EntityKind, Identified};
use std::collections::{BTreeMap, BTreeSet};

/// How the loop treats an entity that already exists in the destination.
pub(crate) enum WritePolicy<'a> {
    /// Last write wins: overwrite whatever the destination holds.
    Overwrite,
    /// Freshness merge (hydration): overwrite only when the source copy
    /// is strictly newer. A missing destination record is always written;
    /// a missing timestamp on either side keeps the destination copy,
    /// since safety favors not clobbering local edits with ambiguous
    /// data.
    IfNewer {
        /// Destination contents captured before the transfer.
        existing: &'a DataSnapshot,
    },
}

/// What one transfer pass accomplished.
#[derive(Debug, Default)]
pub(crate) struct TransferOutcome {
    pub written: WrittenLedger,
    /// Entities left untouched because the destination copy was fresher
    /// (or freshness was ambiguous). Only populated under `IfNewer`.
    pub skipped_fresh: EntityCounts,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// True when the session could not be re-validated mid-loop and the
    /// pass stopped early with partial counts.
    pub aborted_auth: bool,
}

/// How close to expiry a session must be before the game loop spends a
/// round trip re-validating it.
const SESSION_EXPIRY_MARGIN_MIN: i64 = 5;

fn singular(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Player => "player",
        EntityKind::Season => "season",
        EntityKind::Tournament => "tournament",
        EntityKind::Team => "team",
        EntityKind::Roster => "team roster",
        EntityKind::Personnel => "personnel member",
        EntityKind::Game => "game",
        EntityKind::Adjustment => "stat adjustment",
        EntityKind::WarmupPlan => "warm-up plan",
        EntityKind::Settings => "settings",
    }
}

type StampMap<'a> = BTreeMap<&'a str, Option<DateTime<Utc>>>;

fn stamp_map<T: Identified>(entities: &[T]) -> StampMap<'_> {
    entities.iter().map(|e| (e.id(), e.updated_at())).collect()
}

/// True when the destination copy should be overwritten.
fn should_write(
    stamps: Option<&StampMap<'_>>,
    id: &str,
    source_at: Option<DateTime<Utc>>,
) -> bool {
    let Some(stamps) = stamps else {
        return true; // Overwrite policy
    };
    match stamps.get(id) {
        None => true, // missing destination record is always written
        Some(dest_at) => match (source_at, dest_at) {
            (Some(src), Some(dst)) => src > *dst,
            _ => false,
        },
    }
}

struct Progress<'a, 'b> {
    reporter: &'a Reporter<'b>,
    stage: MigrationStage,
    done: usize,
    total: usize,
}

impl Progress<'_, '_> {
    fn percent(&self) -> u8 {
        let base = self.stage.base_percent() as usize;
        let span = MigrationStage::Verifying.base_percent() as usize - base;
        (base + self.done * span / self.total.max(1)) as u8
    }

    fn begin_kind(&self, kind: EntityKind) {
        self.reporter.emit(
            ProgressEvent::at_stage(self.stage)
                .with_percent(self.percent())
                .with_entity(kind.label()),
        );
    }

    fn advance(&mut self, n: usize) {
        self.done += n;
    }
}

/// Copies a sanitized snapshot into the destination adapter.
pub(crate) fn transfer_snapshot(
    snapshot: &DataSnapshot,
    destination: &dyn StoreAdapter,
    policy: WritePolicy<'_>,
    auth: &dyn AuthService,
    config: &MigrationConfig,
    reporter: &Reporter<'_>,
    stage: MigrationStage,
) -> TransferOutcome {
    let mut outcome = TransferOutcome::default();
    let existing = match &policy {
        WritePolicy::Overwrite => None,
        WritePolicy::IfNewer { existing } => Some(*existing),
    };
    let mut progress = Progress {
        reporter,
        stage,
        done: 0,
        total: snapshot.counts().total(),
    };

    // IDs whose write failed, per referenced kind; dependents clear these
    // references before their own write.
    let mut failed_players: BTreeSet<&str> = BTreeSet::new();
    let mut failed_seasons: BTreeSet<&str> = BTreeSet::new();
    let mut failed_tournaments: BTreeSet<&str> = BTreeSet::new();
    let mut failed_teams: BTreeSet<&str> = BTreeSet::new();

    // Players
    progress.begin_kind(EntityKind::Player);
    let stamps = existing.map(|e| stamp_map(&e.players));
    for player in &snapshot.players {
        if !should_write(stamps.as_ref(), &player.id, player.updated_at) {
            outcome.skipped_fresh.add_one(EntityKind::Player);
            continue;
        }
        match destination.upsert_player(player) {
            Ok(()) => outcome.written.record(EntityKind::Player, &player.id),
            Err(e) => {
                failed_players.insert(&player.id);
                outcome
                    .errors
                    .push(format!("could not write player {}: {e}", player.id));
            }
        }
    }
    progress.advance(snapshot.players.len());

    // Seasons
    progress.begin_kind(EntityKind::Season);
    let stamps = existing.map(|e| stamp_map(&e.seasons));
    for season in &snapshot.seasons {
        if !should_write(stamps.as_ref(), &season.id, season.updated_at) {
            outcome.skipped_fresh.add_one(EntityKind::Season);
            continue;
        }
        match destination.upsert_season(season) {
            Ok(()) => outcome.written.record(EntityKind::Season, &season.id),
            Err(e) => {
                failed_seasons.insert(&season.id);
                outcome
                    .errors
                    .push(format!("could not write season {}: {e}", season.id));
            }
        }
    }
    progress.advance(snapshot.seasons.len());

    // Tournaments
    progress.begin_kind(EntityKind::Tournament);
    let stamps = existing.map(|e| stamp_map(&e.tournaments));
    for tournament in &snapshot.tournaments {
        if !should_write(stamps.as_ref(), &tournament.id, tournament.updated_at) {
            outcome.skipped_fresh.add_one(EntityKind::Tournament);
            continue;
        }
        match destination.upsert_tournament(tournament) {
            Ok(()) => outcome.written.record(EntityKind::Tournament, &tournament.id),
            Err(e) => {
                failed_tournaments.insert(&tournament.id);
                outcome
                    .errors
                    .push(format!("could not write tournament {}: {e}", tournament.id));
            }
        }
    }
    progress.advance(snapshot.tournaments.len());

    // Teams
    progress.begin_kind(EntityKind::Team);
    let stamps = existing.map(|e| stamp_map(&e.teams));
    for team in &snapshot.teams {
        if !should_write(stamps.as_ref(), &team.id, team.updated_at) {
            outcome.skipped_fresh.add_one(EntityKind::Team);
            continue;
        }
        let source_id: &str = &team.id;
        let mut team = team.clone();
        clear_failed_ref(
            &mut team.season_id,
            &failed_seasons,
            EntityKind::Team,
            &team.id,
            "season",
            &mut outcome.warnings,
        );
        clear_failed_ref(
            &mut team.tournament_id,
            &failed_tournaments,
            EntityKind::Team,
            &team.id,
            "tournament",
            &mut outcome.warnings,
        );
        match destination.upsert_team(&team) {
            Ok(()) => outcome.written.record(EntityKind::Team, &team.id),
            Err(e) => {
                outcome
                    .errors
                    .push(format!("could not write team {}: {e}", team.id));
                failed_teams.insert(source_id);
            }
        }
    }
    progress.advance(snapshot.teams.len());

    // Team rosters
    progress.begin_kind(EntityKind::Roster);
    let existing_rosters: Option<BTreeSet<&str>> =
        existing.map(|e| e.rosters.iter().map(|r| r.team_id.as_str()).collect());
    for roster in &snapshot.rosters {
        if failed_teams.contains(roster.team_id.as_str()) {
            outcome.warnings.push(format!(
                "roster for team {} skipped: the team itself could not be written",
                roster.team_id
            ));
            continue;
        }
        // Rosters carry no timestamp; under a freshness merge an existing
        // destination roster is kept.
        if let Some(existing_rosters) = &existing_rosters {
            if existing_rosters.contains(roster.team_id.as_str()) {
                outcome.skipped_fresh.add_one(EntityKind::Roster);
                continue;
            }
        }
        match destination.set_team_roster(&roster.team_id, roster) {
            Ok(()) => outcome.written.record(EntityKind::Roster, &roster.team_id),
            Err(e) => outcome.warnings.push(format!(
                "could not write team roster {}: {e} (re-derivable)",
                roster.team_id
            )),
        }
    }
    progress.advance(snapshot.rosters.len());

    // Personnel
    progress.begin_kind(EntityKind::Personnel);
    let stamps = existing.map(|e| stamp_map(&e.personnel));
    for member in &snapshot.personnel {
        if !should_write(stamps.as_ref(), &member.id, member.updated_at) {
            outcome.skipped_fresh.add_one(EntityKind::Personnel);
            continue;
        }
        match destination.upsert_personnel_member(member) {
            Ok(()) => outcome.written.record(EntityKind::Personnel, &member.id),
            Err(e) => outcome
                .errors
                .push(format!("could not write personnel member {}: {e}", member.id)),
        }
    }
    progress.advance(snapshot.personnel.len());

    // Games, with periodic session re-validation: this is the longest
    // loop and an expired token must stop it rather than drop data.
    progress.begin_kind(EntityKind::Game);
    let interval = config.session_check_interval.max(1);
    let margin = Duration::minutes(SESSION_EXPIRY_MARGIN_MIN);
    let mut session: Option<Session> = None;
    let stamps = existing.map(|e| stamp_map(&e.games));
    for (index, game) in snapshot.games.iter().enumerate() {
        if should_write(stamps.as_ref(), &game.id, game.updated_at) {
            let mut game = game.clone();
            clear_failed_ref(
                &mut game.season_id,
                &failed_seasons,
                EntityKind::Game,
                &game.id,
                "season",
                &mut outcome.warnings,
            );
            clear_failed_ref(
                &mut game.tournament_id,
                &failed_tournaments,
                EntityKind::Game,
                &game.id,
                "tournament",
                &mut outcome.warnings,
            );
            clear_failed_ref(
                &mut game.team_id,
                &failed_teams,
                EntityKind::Game,
                &game.id,
                "team",
                &mut outcome.warnings,
            );
            match destination.save_game(&game.id, &game) {
                Ok(()) => outcome.written.record(EntityKind::Game, &game.id),
                Err(e) => outcome
                    .errors
                    .push(format!("could not write game {}: {e}", game.id)),
            }
        } else {
            outcome.skipped_fresh.add_one(EntityKind::Game);
        }

        if (index + 1) % interval == 0 {
            // A session with a known, comfortably distant expiry skips
            // the round trip; an unknown expiry always re-validates.
            let stale = session.as_ref().map_or(true, |s| s.is_near_expiry(margin));
            if stale {
                match auth.refresh_session() {
                    Ok(s) => session = Some(s),
                    Err(e) => {
                        outcome.errors.push(format!(
                            "session could not be refreshed mid-transfer ({e}); \
                             stopping with partial results; re-authenticate and retry"
                        ));
                        outcome.aborted_auth = true;
                        return outcome;
                    }
                }
            }
            progress.reporter.emit(
                ProgressEvent::at_stage(stage)
                    .with_percent(progress.percent())
                    .with_entity(EntityKind::Game.label())
                    .with_message(format!("{} of {}", index + 1, snapshot.games.len())),
            );
        }
        progress.advance(1);
    }

    // Stat adjustments
    progress.begin_kind(EntityKind::Adjustment);
    let stamps = existing.map(|e| stamp_map(&e.adjustments));
    for adjustment in &snapshot.adjustments {
        if failed_players.contains(adjustment.player_id.as_str()) {
            outcome.warnings.push(format!(
                "stat adjustment {} skipped: its player could not be written",
                adjustment.id
            ));
            continue;
        }
        if !should_write(stamps.as_ref(), &adjustment.id, adjustment.updated_at) {
            outcome.skipped_fresh.add_one(EntityKind::Adjustment);
            continue;
        }
        let mut adjustment = adjustment.clone();
        let id = adjustment.id.clone();
        clear_failed_ref(
            &mut adjustment.season_id,
            &failed_seasons,
            EntityKind::Adjustment,
            &id,
            "season",
            &mut outcome.warnings,
        );
        clear_failed_ref(
            &mut adjustment.tournament_id,
            &failed_tournaments,
            EntityKind::Adjustment,
            &id,
            "tournament",
            &mut outcome.warnings,
        );
        match destination.upsert_player_adjustment(&adjustment) {
            Ok(()) => outcome.written.record(EntityKind::Adjustment, &id),
            Err(e) => outcome.warnings.push(format!(
                "could not write stat adjustment {id}: {e} (re-derivable)"
            )),
        }
    }
    progress.advance(snapshot.adjustments.len());

    // Singleton documents
    if let Some(plan) = &snapshot.warmup_plan {
        let keep_existing = matches!(&policy, WritePolicy::IfNewer { existing }
            if !doc_newer(plan.updated_at, existing.warmup_plan.as_ref().map(|p| p.updated_at)));
        if keep_existing {
            outcome.skipped_fresh.add_one(EntityKind::WarmupPlan);
        } else {
            match destination.save_warmup_plan(plan) {
                Ok(()) => outcome.written.record_singleton(EntityKind::WarmupPlan),
                Err(e) => outcome
                    .warnings
                    .push(format!("could not write warm-up plan: {e}")),
            }
        }
    }
    if let Some(settings) = &snapshot.settings {
        let keep_existing = matches!(&policy, WritePolicy::IfNewer { existing }
            if !doc_newer(settings.updated_at, existing.settings.as_ref().map(|s| s.updated_at)));
        if keep_existing {
            outcome.skipped_fresh.add_one(EntityKind::Settings);
        } else {
            match destination.save_settings(settings) {
                Ok(()) => outcome.written.record_singleton(EntityKind::Settings),
                Err(e) => outcome
                    .warnings
                    .push(format!("could not write settings: {e}")),
            }
        }
    }

    outcome
}

/// Freshness rule for singleton documents: write when the destination has
/// none, overwrite only when the source is strictly newer.
fn doc_newer(
    source_at: Option<DateTime<Utc>>,
    destination: Option<Option<DateTime<Utc>>>,
) -> bool {
    match destination {
        None => true,
        Some(dest_at) => matches!((source_at, dest_at), (Some(src), Some(dst)) if src > dst),
    }
}

fn clear_failed_ref(
    reference: &mut Option<String>,
    failed: &BTreeSet<&str>,
    kind: EntityKind,
    id: &str,
    what: &str,
    warnings: &mut Vec<String>,
) {
    if let Some(target) = reference.as_deref() {
        if failed.contains(target) {
            warnings.push(format!(
                "{} {id}: {what} reference {target:?} cleared because the {what} \
                 itself could not be written",
                singular(kind)
            ));
            *reference = None;
        }
    }
}
