//! The store adapter seam.
//!
//! Both storage backends (the embedded local-first store and the cloud
//! relational store) are external collaborators. The engine talks to them
//! only through [`StoreAdapter`], a uniform per-entity CRUD/upsert
//! contract, so the forward and reverse directions are the same pipeline
//! with source and destination swapped.
//!
//! [`MemoryStore`] is a complete in-memory adapter with failure-injection
//! controls. It backs the test suite and is useful for seeding.

use crate::error::{MigrateError, MigrateResult};
use matchday_model::{
    AppSettings, DataSnapshot, EntityCounts, Game, Personnel, Player, PlayerStatAdjustment,
    Season, Team, TeamRoster, Tournament, WarmupPlan,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a store adapter can report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store's backing service is unreachable.
    #[error("store is offline")]
    Offline,

    /// The store was used before `initialize` (or after `close`).
    #[error("store not initialized")]
    NotInitialized,

    /// A read failed.
    #[error("read failed: {0}")]
    Read(String),

    /// A single upsert/save failed. The operation records this and moves
    /// on to the next entity.
    #[error("write failed for {label} {id}: {message}")]
    Write {
        /// Entity category label.
        label: String,
        /// Entity ID (or team ID for rosters).
        id: String,
        /// Backend error text.
        message: String,
    },

    /// Clearing the store's user data failed.
    #[error("clear failed: {0}")]
    Clear(String),
}

/// Uniform per-entity contract implemented once for the local store and
/// once for the cloud store.
///
/// All `upsert_*`/`save_*` operations are idempotent: inserting when the
/// ID is absent, overwriting when present. That property is the basis for
/// retry safety across the whole engine.
pub trait StoreAdapter: Send + Sync {
    /// Opens the store for this operation.
    fn initialize(&self) -> StoreResult<()>;

    /// Releases the store. Called on every exit path.
    fn close(&self) -> StoreResult<()>;

    /// Reads all players.
    fn get_players(&self) -> StoreResult<Vec<Player>>;
    /// Inserts or overwrites a player by ID.
    fn upsert_player(&self, player: &Player) -> StoreResult<()>;

    /// Reads all teams, optionally including soft-deleted ones.
    fn get_teams(&self, include_deleted: bool) -> StoreResult<Vec<Team>>;
    /// Inserts or overwrites a team by ID.
    fn upsert_team(&self, team: &Team) -> StoreResult<()>;

    /// Reads the roster for one team, if it has one.
    fn get_team_roster(&self, team_id: &str) -> StoreResult<Option<TeamRoster>>;
    /// Replaces the roster for one team.
    fn set_team_roster(&self, team_id: &str, roster: &TeamRoster) -> StoreResult<()>;

    /// Reads all seasons. `apply_migrations` asks the backend to upgrade
    /// legacy rows to the current schema while reading.
    fn get_seasons(&self, apply_migrations: bool) -> StoreResult<Vec<Season>>;
    /// Inserts or overwrites a season by ID.
    fn upsert_season(&self, season: &Season) -> StoreResult<()>;

    /// Reads all tournaments (see [`StoreAdapter::get_seasons`]).
    fn get_tournaments(&self, apply_migrations: bool) -> StoreResult<Vec<Tournament>>;
    /// Inserts or overwrites a tournament by ID.
    fn upsert_tournament(&self, tournament: &Tournament) -> StoreResult<()>;

    /// Reads all personnel.
    fn get_all_personnel(&self) -> StoreResult<Vec<Personnel>>;
    /// Inserts or overwrites a personnel member by ID.
    fn upsert_personnel_member(&self, member: &Personnel) -> StoreResult<()>;

    /// Reads all games.
    fn get_games(&self) -> StoreResult<Vec<Game>>;
    /// Inserts or overwrites a game under the given ID.
    fn save_game(&self, id: &str, game: &Game) -> StoreResult<()>;

    /// Reads every player's stat adjustments in one call.
    fn get_all_player_adjustments(&self) -> StoreResult<Vec<PlayerStatAdjustment>>;
    /// Inserts or overwrites a stat adjustment by ID.
    fn upsert_player_adjustment(&self, adjustment: &PlayerStatAdjustment) -> StoreResult<()>;

    /// Reads the warm-up plan document, if present.
    fn get_warmup_plan(&self) -> StoreResult<Option<WarmupPlan>>;
    /// Saves the warm-up plan document.
    fn save_warmup_plan(&self, plan: &WarmupPlan) -> StoreResult<()>;

    /// Reads the settings document, if present.
    fn get_settings(&self) -> StoreResult<Option<AppSettings>>;
    /// Saves the settings document.
    fn save_settings(&self, settings: &AppSettings) -> StoreResult<()>;

    /// Deletes every piece of this account's data in the store.
    fn clear_all_user_data(&self) -> StoreResult<()>;
}

/// Reads a full snapshot from an adapter.
///
/// Rosters are collected per team, after the team list itself. Any read
/// failure aborts the export before a single destination write happens.
pub fn export_snapshot(store: &dyn StoreAdapter) -> StoreResult<DataSnapshot> {
    let players = store.get_players()?;
    let seasons = store.get_seasons(true)?;
    let tournaments = store.get_tournaments(true)?;
    let teams = store.get_teams(true)?;

    let mut rosters = Vec::new();
    for team in &teams {
        if let Some(roster) = store.get_team_roster(&team.id)? {
            rosters.push(roster);
        }
    }

    Ok(DataSnapshot {
        players,
        seasons,
        tournaments,
        teams,
        rosters,
        personnel: store.get_all_personnel()?,
        games: store.get_games()?,
        adjustments: store.get_all_player_adjustments()?,
        warmup_plan: store.get_warmup_plan()?,
        settings: store.get_settings()?,
    })
}

/// Reads per-type counts from an adapter.
pub fn read_counts(store: &dyn StoreAdapter) -> StoreResult<EntityCounts> {
    Ok(export_snapshot(store)?.counts())
}

/// Opens a pair of stores and guarantees both are closed on every exit
/// path, including panics and early returns.
pub(crate) struct StorePair<'a> {
    source: &'a dyn StoreAdapter,
    destination: &'a dyn StoreAdapter,
}

impl<'a> StorePair<'a> {
    /// Initializes both stores; failure to open either is a preflight
    /// error (the already-opened one is closed again).
    pub(crate) fn open(
        source: &'a dyn StoreAdapter,
        destination: &'a dyn StoreAdapter,
    ) -> MigrateResult<Self> {
        source.initialize().map_err(MigrateError::store)?;
        if let Err(e) = destination.initialize() {
            if let Err(close_err) = source.close() {
                tracing::warn!(error = %close_err, "source close failed after open error");
            }
            return Err(MigrateError::store(e));
        }
        Ok(Self {
            source,
            destination,
        })
    }
}

impl Drop for StorePair<'_> {
    fn drop(&mut self) {
        for (name, store) in [("source", self.source), ("destination", self.destination)] {
            if let Err(e) = store.close() {
                tracing::warn!(store = name, error = %e, "store close failed");
            }
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    players: BTreeMap<String, Player>,
    seasons: BTreeMap<String, Season>,
    tournaments: BTreeMap<String, Tournament>,
    teams: BTreeMap<String, Team>,
    rosters: BTreeMap<String, TeamRoster>,
    personnel: BTreeMap<String, Personnel>,
    games: BTreeMap<String, Game>,
    adjustments: BTreeMap<String, PlayerStatAdjustment>,
    warmup_plan: Option<WarmupPlan>,
    settings: Option<AppSettings>,
}

impl MemoryInner {
    fn to_snapshot(&self) -> DataSnapshot {
        DataSnapshot {
            players: self.players.values().cloned().collect(),
            seasons: self.seasons.values().cloned().collect(),
            tournaments: self.tournaments.values().cloned().collect(),
            teams: self.teams.values().cloned().collect(),
            rosters: self.rosters.values().cloned().collect(),
            personnel: self.personnel.values().cloned().collect(),
            games: self.games.values().cloned().collect(),
            adjustments: self.adjustments.values().cloned().collect(),
            warmup_plan: self.warmup_plan.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// An in-memory store adapter with failure injection.
///
/// Deterministic: reads return entities ordered by ID.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    initialized: AtomicBool,
    offline: AtomicBool,
    fail_reads: AtomicBool,
    fail_clear: AtomicBool,
    fail_writes_for: Mutex<BTreeSet<String>>,
    drop_writes_for: Mutex<BTreeSet<String>>,
    write_ops: AtomicUsize,
    clear_calls: AtomicUsize,
    close_calls: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-loaded with a snapshot's contents.
    pub fn from_snapshot(snapshot: &DataSnapshot) -> Self {
        let store = Self::new();
        store.seed_snapshot(snapshot);
        store
    }

    /// Loads a snapshot directly, bypassing the adapter contract (and all
    /// failure injection). Test/seeding helper.
    pub fn seed_snapshot(&self, snapshot: &DataSnapshot) {
        let mut inner = self.inner.write();
        for p in &snapshot.players {
            inner.players.insert(p.id.clone(), p.clone());
        }
        for s in &snapshot.seasons {
            inner.seasons.insert(s.id.clone(), s.clone());
        }
        for t in &snapshot.tournaments {
            inner.tournaments.insert(t.id.clone(), t.clone());
        }
        for t in &snapshot.teams {
            inner.teams.insert(t.id.clone(), t.clone());
        }
        for r in &snapshot.rosters {
            inner.rosters.insert(r.team_id.clone(), r.clone());
        }
        for m in &snapshot.personnel {
            inner.personnel.insert(m.id.clone(), m.clone());
        }
        for g in &snapshot.games {
            inner.games.insert(g.id.clone(), g.clone());
        }
        for a in &snapshot.adjustments {
            inner.adjustments.insert(a.id.clone(), a.clone());
        }
        if snapshot.warmup_plan.is_some() {
            inner.warmup_plan = snapshot.warmup_plan.clone();
        }
        if snapshot.settings.is_some() {
            inner.settings = snapshot.settings.clone();
        }
    }

    /// Full contents as a snapshot, bypassing failure injection.
    pub fn contents(&self) -> DataSnapshot {
        self.inner.read().to_snapshot()
    }

    /// Canonical JSON of the full contents, for byte-identical comparisons.
    pub fn canonical_bytes(&self) -> String {
        // MemoryInner is BTreeMap-backed, so this is deterministic.
        self.contents()
            .canonical_json()
            .unwrap_or_else(|_| String::new())
    }

    /// Simulates the backing service going offline (or back online).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes all reads fail until reset.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes `clear_all_user_data` fail until reset.
    pub fn set_fail_clear(&self, fail: bool) {
        self.fail_clear.store(fail, Ordering::SeqCst);
    }

    /// Makes writes fail for the given entity ID (or team ID for rosters).
    pub fn fail_writes_for(&self, id: impl Into<String>) {
        self.fail_writes_for.lock().insert(id.into());
    }

    /// Makes writes for the given ID report success without storing
    /// anything, simulating a lossy backend.
    pub fn drop_writes_for(&self, id: impl Into<String>) {
        self.drop_writes_for.lock().insert(id.into());
    }

    /// Number of successful write operations performed so far.
    pub fn write_ops(&self) -> usize {
        self.write_ops.load(Ordering::SeqCst)
    }

    /// Number of times `clear_all_user_data` was invoked.
    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }

    /// Number of times `close` was invoked.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn check_ready(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline);
        }
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(StoreError::NotInitialized);
        }
        Ok(())
    }

    fn check_read(&self) -> StoreResult<()> {
        self.check_ready()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("injected read failure".into()));
        }
        Ok(())
    }

    /// Returns whether the write should actually persist; a dropped write
    /// reports success to the caller but stores nothing.
    fn check_write(&self, label: &str, id: &str) -> StoreResult<bool> {
        self.check_ready()?;
        if self.fail_writes_for.lock().contains(id) {
            return Err(StoreError::Write {
                label: label.into(),
                id: id.into(),
                message: "injected write failure".into(),
            });
        }
        self.write_ops.fetch_add(1, Ordering::SeqCst);
        Ok(!self.drop_writes_for.lock().contains(id))
    }
}

impl StoreAdapter for MemoryStore {
    fn initialize(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Offline);
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.initialized.store(false, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_players(&self) -> StoreResult<Vec<Player>> {
        self.check_read()?;
        Ok(self.inner.read().players.values().cloned().collect())
    }

    fn upsert_player(&self, player: &Player) -> StoreResult<()> {
        if self.check_write("player", &player.id)? {
            self.inner
                .write()
                .players
                .insert(player.id.clone(), player.clone());
        }
        Ok(())
    }

    fn get_teams(&self, include_deleted: bool) -> StoreResult<Vec<Team>> {
        self.check_read()?;
        Ok(self
            .inner
            .read()
            .teams
            .values()
            .filter(|t| include_deleted || !t.deleted)
            .cloned()
            .collect())
    }

    fn upsert_team(&self, team: &Team) -> StoreResult<()> {
        if self.check_write("team", &team.id)? {
            self.inner.write().teams.insert(team.id.clone(), team.clone());
        }
        Ok(())
    }

    fn get_team_roster(&self, team_id: &str) -> StoreResult<Option<TeamRoster>> {
        self.check_read()?;
        Ok(self.inner.read().rosters.get(team_id).cloned())
    }

    fn set_team_roster(&self, team_id: &str, roster: &TeamRoster) -> StoreResult<()> {
        if self.check_write("roster", team_id)? {
            self.inner
                .write()
                .rosters
                .insert(team_id.to_string(), roster.clone());
        }
        Ok(())
    }

    fn get_seasons(&self, _apply_migrations: bool) -> StoreResult<Vec<Season>> {
        self.check_read()?;
        Ok(self.inner.read().seasons.values().cloned().collect())
    }

    fn upsert_season(&self, season: &Season) -> StoreResult<()> {
        if self.check_write("season", &season.id)? {
            self.inner
                .write()
                .seasons
                .insert(season.id.clone(), season.clone());
        }
        Ok(())
    }

    fn get_tournaments(&self, _apply_migrations: bool) -> StoreResult<Vec<Tournament>> {
        self.check_read()?;
        Ok(self.inner.read().tournaments.values().cloned().collect())
    }

    fn upsert_tournament(&self, tournament: &Tournament) -> StoreResult<()> {
        if self.check_write("tournament", &tournament.id)? {
            self.inner
                .write()
                .tournaments
                .insert(tournament.id.clone(), tournament.clone());
        }
        Ok(())
    }

    fn get_all_personnel(&self) -> StoreResult<Vec<Personnel>> {
        self.check_read()?;
        Ok(self.inner.read().personnel.values().cloned().collect())
    }

    fn upsert_personnel_member(&self, member: &Personnel) -> StoreResult<()> {
        if self.check_write("personnel", &member.id)? {
            self.inner
                .write()
                .personnel
                .insert(member.id.clone(), member.clone());
        }
        Ok(())
    }

    fn get_games(&self) -> StoreResult<Vec<Game>> {
        self.check_read()?;
        Ok(self.inner.read().games.values().cloned().collect())
    }

    fn save_game(&self, id: &str, game: &Game) -> StoreResult<()> {
        if self.check_write("game", id)? {
            self.inner.write().games.insert(id.to_string(), game.clone());
        }
        Ok(())
    }

    fn get_all_player_adjustments(&self) -> StoreResult<Vec<PlayerStatAdjustment>> {
        self.check_read()?;
        Ok(self.inner.read().adjustments.values().cloned().collect())
    }

    fn upsert_player_adjustment(&self, adjustment: &PlayerStatAdjustment) -> StoreResult<()> {
        if self.check_write("adjustment", &adjustment.id)? {
            self.inner
                .write()
                .adjustments
                .insert(adjustment.id.clone(), adjustment.clone());
        }
        Ok(())
    }

    fn get_warmup_plan(&self) -> StoreResult<Option<WarmupPlan>> {
        self.check_read()?;
        Ok(self.inner.read().warmup_plan.clone())
    }

    fn save_warmup_plan(&self, plan: &WarmupPlan) -> StoreResult<()> {
        if self.check_write("warmup plan", "warmup_plan")? {
            self.inner.write().warmup_plan = Some(plan.clone());
        }
        Ok(())
    }

    fn get_settings(&self) -> StoreResult<Option<AppSettings>> {
        self.check_read()?;
        Ok(self.inner.read().settings.clone())
    }

    fn save_settings(&self, settings: &AppSettings) -> StoreResult<()> {
        if self.check_write("settings", "settings")? {
            self.inner.write().settings = Some(settings.clone());
        }
        Ok(())
    }

    fn clear_all_user_data(&self) -> StoreResult<()> {
        self.check_ready()?;
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(StoreError::Clear("injected clear failure".into()));
        }
        *self.inner.write() = MemoryInner::default();
        Ok(())
    }
}
