//! Entity sanitizer/validator.
//!
//! Repairs or quarantines malformed records before they cross the network
//! boundary. This module is pure: the same input snapshot always yields
//! the same output snapshot, repair list and skip list, which is what
//! makes whole-operation retries and testing tractable.
//!
//! Repair rules are entity-specific and deterministic. An entity that
//! still fails validation after repair is quarantined ("skipped") with a
//! human-readable reason and excluded from the transfer entirely; a
//! half-broken record must never reach the destination.

use matchday_model::{
    is_blank_id, DataSnapshot, EntityKind, Game, GameStatus, HomeAway, PlayerStatAdjustment,
    TeamRoster,
};
use std::collections::BTreeSet;

/// Placeholder for a blank team name.
pub const DEFAULT_TEAM_NAME: &str = "Team";
/// Placeholder for a blank opponent name.
pub const DEFAULT_OPPONENT_NAME: &str = "Opponent";
/// Placeholder for a blank player name.
pub const DEFAULT_PLAYER_NAME: &str = "Player";
/// Placeholder for a blank personnel name.
pub const DEFAULT_PERSONNEL_NAME: &str = "Staff";
/// Placeholder for a blank season or tournament name.
pub const DEFAULT_COMPETITION_NAME: &str = "Season";
/// Period duration applied when the source value is zero or negative.
pub const DEFAULT_PERIOD_DURATION_MIN: i32 = 10;
/// Period count applied when the source value is not 1 or 2.
pub const DEFAULT_PERIOD_COUNT: u32 = 2;
/// Maximum length of free-text fields; longer values are truncated.
pub const MAX_TEXT_LEN: usize = 500;

/// One repair made to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    /// Entity category.
    pub kind: EntityKind,
    /// Entity ID (team ID for rosters).
    pub id: String,
    /// What was repaired.
    pub detail: String,
}

impl Repair {
    /// Formats the repair as a report warning.
    pub fn message(&self) -> String {
        format!("repaired {} {}: {}", self.kind.label(), self.id, self.detail)
    }
}

/// One entity that could not be repaired and was excluded from transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntity {
    /// Entity category.
    pub kind: EntityKind,
    /// Entity ID, or a placeholder when the ID itself was unusable.
    pub id: String,
    /// Human-readable reason.
    pub reason: String,
}

impl SkippedEntity {
    /// Formats the skip as a report line.
    pub fn message(&self) -> String {
        format!("skipped {} {}: {}", self.kind.label(), self.id, self.reason)
    }
}

/// Result of sanitizing a snapshot.
#[derive(Debug, Clone, Default)]
pub struct SanitizeOutcome {
    /// The normalized snapshot, safe to transfer.
    pub snapshot: DataSnapshot,
    /// Repairs that were applied.
    pub repairs: Vec<Repair>,
    /// Entities that could not be repaired.
    pub skipped: Vec<SkippedEntity>,
}

impl SanitizeOutcome {
    /// Number of skipped entities of one kind.
    pub fn skipped_of(&self, kind: EntityKind) -> usize {
        self.skipped.iter().filter(|s| s.kind == kind).count()
    }
}

struct Ctx {
    repairs: Vec<Repair>,
    skipped: Vec<SkippedEntity>,
}

impl Ctx {
    fn repair(&mut self, kind: EntityKind, id: &str, detail: impl Into<String>) {
        self.repairs.push(Repair {
            kind,
            id: id.to_string(),
            detail: detail.into(),
        });
    }

    fn skip(&mut self, kind: EntityKind, id: &str, reason: impl Into<String>) {
        let id = if is_blank_id(id) { "<no id>" } else { id };
        self.skipped.push(SkippedEntity {
            kind,
            id: id.to_string(),
            reason: reason.into(),
        });
    }
}

/// Sanitizes a raw source snapshot.
///
/// Pure and side-effect-free; see the module docs for the rule set.
pub fn sanitize_snapshot(raw: &DataSnapshot) -> SanitizeOutcome {
    let mut ctx = Ctx {
        repairs: Vec::new(),
        skipped: Vec::new(),
    };
    let mut out = DataSnapshot::default();

    // Keyed entities with a blank or duplicate ID are structurally
    // unusable and quarantined up front; the surviving ID sets are what
    // foreign keys must resolve against.
    let mut player_ids = BTreeSet::new();
    for player in &raw.players {
        if !keep_id(EntityKind::Player, &player.id, &mut player_ids, &mut ctx) {
            continue;
        }
        let mut player = player.clone();
        if player.name.trim().is_empty() {
            player.name = DEFAULT_PLAYER_NAME.into();
            ctx.repair(EntityKind::Player, &player.id, "blank name defaulted");
        }
        truncate_opt(&mut player.notes, EntityKind::Player, &player.id, "notes", &mut ctx);
        out.players.push(player);
    }

    let mut season_ids = BTreeSet::new();
    for season in &raw.seasons {
        if !keep_id(EntityKind::Season, &season.id, &mut season_ids, &mut ctx) {
            continue;
        }
        let mut season = season.clone();
        fix_competition_name(&mut season.name, EntityKind::Season, &season.id, &mut ctx);
        out.seasons.push(season);
    }

    let mut tournament_ids = BTreeSet::new();
    for tournament in &raw.tournaments {
        if !keep_id(
            EntityKind::Tournament,
            &tournament.id,
            &mut tournament_ids,
            &mut ctx,
        ) {
            continue;
        }
        let mut tournament = tournament.clone();
        fix_competition_name(
            &mut tournament.name,
            EntityKind::Tournament,
            &tournament.id,
            &mut ctx,
        );
        out.tournaments.push(tournament);
    }

    let mut team_ids = BTreeSet::new();
    for team in &raw.teams {
        if !keep_id(EntityKind::Team, &team.id, &mut team_ids, &mut ctx) {
            continue;
        }
        let mut team = team.clone();
        if team.name.trim().is_empty() {
            team.name = DEFAULT_TEAM_NAME.into();
            ctx.repair(EntityKind::Team, &team.id, "blank name defaulted");
        }
        clear_orphan(
            &mut team.season_id,
            &season_ids,
            EntityKind::Team,
            &team.id,
            "season reference",
            &mut ctx,
        );
        clear_orphan(
            &mut team.tournament_id,
            &tournament_ids,
            EntityKind::Team,
            &team.id,
            "tournament reference",
            &mut ctx,
        );
        out.teams.push(team);
    }

    for roster in &raw.rosters {
        out.rosters
            .extend(sanitize_roster(roster, &team_ids, &player_ids, &mut ctx));
    }

    let mut personnel_ids = BTreeSet::new();
    for member in &raw.personnel {
        if !keep_id(
            EntityKind::Personnel,
            &member.id,
            &mut personnel_ids,
            &mut ctx,
        ) {
            continue;
        }
        let mut member = member.clone();
        if member.name.trim().is_empty() {
            member.name = DEFAULT_PERSONNEL_NAME.into();
            ctx.repair(EntityKind::Personnel, &member.id, "blank name defaulted");
        }
        out.personnel.push(member);
    }

    let mut game_ids = BTreeSet::new();
    for game in &raw.games {
        if !keep_id(EntityKind::Game, &game.id, &mut game_ids, &mut ctx) {
            continue;
        }
        let mut game = game.clone();
        repair_game(
            &mut game,
            &season_ids,
            &tournament_ids,
            &team_ids,
            &mut ctx,
        );
        // Re-validate after repair; what the rules cannot fix is
        // quarantined rather than uploaded half-broken.
        if let Some(reason) = validate_game(&game) {
            ctx.skip(EntityKind::Game, &game.id, reason);
            continue;
        }
        out.games.push(game);
    }

    let mut adjustment_ids = BTreeSet::new();
    for adjustment in &raw.adjustments {
        if !keep_id(
            EntityKind::Adjustment,
            &adjustment.id,
            &mut adjustment_ids,
            &mut ctx,
        ) {
            continue;
        }
        out.adjustments
            .extend(sanitize_adjustment(adjustment, &player_ids, &season_ids, &tournament_ids, &mut ctx));
    }

    if let Some(plan) = &raw.warmup_plan {
        let mut plan = plan.clone();
        for step in &mut plan.steps {
            if step.label.chars().count() > MAX_TEXT_LEN {
                step.label = step.label.chars().take(MAX_TEXT_LEN).collect();
                ctx.repair(
                    EntityKind::WarmupPlan,
                    "warmup_plan",
                    "overlong step label truncated",
                );
            }
        }
        out.warmup_plan = Some(plan);
    }
    out.settings = raw.settings.clone();

    SanitizeOutcome {
        snapshot: out,
        repairs: ctx.repairs,
        skipped: ctx.skipped,
    }
}

fn keep_id(
    kind: EntityKind,
    id: &str,
    seen: &mut BTreeSet<String>,
    ctx: &mut Ctx,
) -> bool {
    if is_blank_id(id) {
        ctx.skip(kind, id, "missing id");
        return false;
    }
    if !seen.insert(id.to_string()) {
        ctx.skip(kind, id, "duplicate id; first occurrence kept");
        return false;
    }
    true
}

fn fix_competition_name(name: &mut String, kind: EntityKind, id: &str, ctx: &mut Ctx) {
    if name.trim().is_empty() {
        *name = DEFAULT_COMPETITION_NAME.into();
        ctx.repair(kind, id, "blank name defaulted");
    } else if name.chars().count() > MAX_TEXT_LEN {
        *name = name.chars().take(MAX_TEXT_LEN).collect();
        ctx.repair(kind, id, "overlong name truncated");
    }
}

fn clear_orphan(
    reference: &mut Option<String>,
    targets: &BTreeSet<String>,
    kind: EntityKind,
    id: &str,
    what: &str,
    ctx: &mut Ctx,
) {
    if let Some(target) = reference.as_deref() {
        if !targets.contains(target) {
            ctx.repair(
                kind,
                id,
                format!("{what} {target:?} does not resolve; cleared"),
            );
            *reference = None;
        }
    }
}

fn sanitize_roster(
    roster: &TeamRoster,
    team_ids: &BTreeSet<String>,
    player_ids: &BTreeSet<String>,
    ctx: &mut Ctx,
) -> Option<TeamRoster> {
    if !team_ids.contains(&roster.team_id) {
        ctx.skip(
            EntityKind::Roster,
            &roster.team_id,
            "owning team does not resolve",
        );
        return None;
    }
    let mut seen = BTreeSet::new();
    let mut kept = Vec::with_capacity(roster.player_ids.len());
    for player_id in &roster.player_ids {
        if !player_ids.contains(player_id) {
            ctx.repair(
                EntityKind::Roster,
                &roster.team_id,
                format!("member {player_id:?} does not resolve; removed"),
            );
            continue;
        }
        if seen.insert(player_id) {
            kept.push(player_id.clone());
        }
    }
    Some(TeamRoster::new(roster.team_id.clone(), kept))
}

fn repair_game(
    game: &mut Game,
    season_ids: &BTreeSet<String>,
    tournament_ids: &BTreeSet<String>,
    team_ids: &BTreeSet<String>,
    ctx: &mut Ctx,
) {
    let id = game.id.clone();
    if game.team_name.trim().is_empty() {
        game.team_name = DEFAULT_TEAM_NAME.into();
        ctx.repair(EntityKind::Game, &id, "blank team name defaulted");
    }
    if game.opponent_name.trim().is_empty() {
        game.opponent_name = DEFAULT_OPPONENT_NAME.into();
        ctx.repair(EntityKind::Game, &id, "blank opponent name defaulted");
    }
    if game.period_duration_min <= 0 {
        game.period_duration_min = DEFAULT_PERIOD_DURATION_MIN;
        ctx.repair(EntityKind::Game, &id, "invalid period duration defaulted");
    }
    if !(1..=2).contains(&game.period_count) {
        game.period_count = DEFAULT_PERIOD_COUNT;
        ctx.repair(EntityKind::Game, &id, "invalid period count defaulted");
    }
    if game.status == GameStatus::Unknown {
        game.status = GameStatus::default();
        ctx.repair(EntityKind::Game, &id, "unknown status defaulted");
    }
    if game.home_or_away == HomeAway::Unknown {
        game.home_or_away = HomeAway::default();
        ctx.repair(EntityKind::Game, &id, "unknown home/away defaulted");
    }
    truncate_opt(&mut game.notes, EntityKind::Game, &id, "notes", ctx);
    clear_orphan(
        &mut game.season_id,
        season_ids,
        EntityKind::Game,
        &id,
        "season reference",
        ctx,
    );
    clear_orphan(
        &mut game.tournament_id,
        tournament_ids,
        EntityKind::Game,
        &id,
        "tournament reference",
        ctx,
    );
    clear_orphan(
        &mut game.team_id,
        team_ids,
        EntityKind::Game,
        &id,
        "team reference",
        ctx,
    );
}

/// Full-schema validation applied after repair. Returns a reason when the
/// game remains untransferable.
fn validate_game(game: &Game) -> Option<String> {
    if game.date.is_none() {
        return Some("no parseable date and no derivable fallback".into());
    }
    None
}

fn sanitize_adjustment(
    adjustment: &PlayerStatAdjustment,
    player_ids: &BTreeSet<String>,
    season_ids: &BTreeSet<String>,
    tournament_ids: &BTreeSet<String>,
    ctx: &mut Ctx,
) -> Option<PlayerStatAdjustment> {
    // player_id is a required reference; there is no "no reference" state
    // to repair it to, so an unresolvable player quarantines the record.
    if !player_ids.contains(&adjustment.player_id) {
        ctx.skip(
            EntityKind::Adjustment,
            &adjustment.id,
            format!("references unknown player {:?}", adjustment.player_id),
        );
        return None;
    }
    let mut adjustment = adjustment.clone();
    let id = adjustment.id.clone();
    clear_orphan(
        &mut adjustment.season_id,
        season_ids,
        EntityKind::Adjustment,
        &id,
        "season reference",
        ctx,
    );
    clear_orphan(
        &mut adjustment.tournament_id,
        tournament_ids,
        EntityKind::Adjustment,
        &id,
        "tournament reference",
        ctx,
    );
    truncate_opt(&mut adjustment.note, EntityKind::Adjustment, &id, "note", ctx);
    Some(adjustment)
}

fn truncate_opt(
    text: &mut Option<String>,
    kind: EntityKind,
    id: &str,
    field: &str,
    ctx: &mut Ctx,
) {
    if let Some(value) = text {
        if value.chars().count() > MAX_TEXT_LEN {
            *value = value.chars().take(MAX_TEXT_LEN).collect();
            ctx.repair(kind, id, format!("overlong {field} truncated"));
        }
    }
}
