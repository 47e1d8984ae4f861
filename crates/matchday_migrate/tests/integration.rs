//! End-to-end tests for the migration engine over in-memory stores.

use chrono::NaiveDate;
use matchday_migrate::{
    ForwardMode, MemoryStore, MigrationConfig, Migrator, NullSink, ProgressEvent, ProgressSink,
    ProgressSinkError, ReverseMode, StaticAuth, StoreAdapter,
};
use matchday_model::{
    DataSnapshot, Game, Player, PlayerStatAdjustment, Season, Team, TeamRoster,
};
use std::sync::Arc;
use std::time::Duration;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 5, day).expect("valid test date")
}

/// A realistic local dataset: a small club with one messy corner (a team
/// referencing a season that no longer exists).
fn club_snapshot() -> DataSnapshot {
    let mut repaired_game = Game::new("g2", "", "Rovers", date(10));
    repaired_game.period_duration_min = 0; // both get repaired, not skipped

    DataSnapshot {
        players: vec![
            Player::new("p1", "Alex"),
            Player::new("p2", "Billie"),
            Player::new("p3", ""),
        ],
        seasons: vec![Season::new("s1", "Spring 2025")],
        teams: vec![
            Team::new("t1", "U10").with_season("s1"),
            Team::new("t2", "U12").with_season("s-deleted"),
        ],
        rosters: vec![TeamRoster::new("t1", vec!["p1".into(), "p2".into()])],
        games: vec![Game::new("g1", "U10", "Rovers", date(3)), repaired_game],
        adjustments: vec![PlayerStatAdjustment::new("a1", "p1")],
        ..Default::default()
    }
}

fn migrator(local: &Arc<MemoryStore>, cloud: &Arc<MemoryStore>) -> Migrator {
    Migrator::new(
        Arc::clone(local) as Arc<dyn StoreAdapter>,
        Arc::clone(cloud) as Arc<dyn StoreAdapter>,
        Arc::new(StaticAuth::new("acct-1")),
    )
}

#[test]
fn forward_migration_of_a_messy_dataset_succeeds_with_warnings() {
    let local = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let cloud = Arc::new(MemoryStore::new());

    let report = migrator(&local, &cloud)
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.counts.players, 3);
    assert_eq!(report.counts.teams, 2);
    assert_eq!(report.counts.games, 2);
    // Blank player name, dangling season ref, blank team name, zero
    // period duration: all repaired, all surfaced.
    assert!(report.warnings.len() >= 3, "warnings: {:?}", report.warnings);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("does not resolve")));

    let uploaded = cloud.contents();
    let t2 = uploaded.teams.iter().find(|t| t.id == "t2").unwrap();
    assert!(t2.season_id.is_none(), "dangling ref must not be uploaded");
    let g2 = uploaded.games.iter().find(|g| g.id == "g2").unwrap();
    assert_eq!(g2.team_name, "Team");
    assert_eq!(g2.period_duration_min, 10);
}

#[test]
fn ids_are_carried_verbatim() {
    let local = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let cloud = Arc::new(MemoryStore::new());

    migrator(&local, &cloud)
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();

    let source = local.contents();
    let uploaded = cloud.contents();
    assert_eq!(source.player_ids(), uploaded.player_ids());
    assert_eq!(source.team_ids(), uploaded.team_ids());
    assert_eq!(
        source.games.iter().map(|g| &g.id).collect::<Vec<_>>(),
        uploaded.games.iter().map(|g| &g.id).collect::<Vec<_>>()
    );
}

#[test]
fn forward_migration_is_idempotent() {
    let local = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let cloud = Arc::new(MemoryStore::new());
    let migrator = migrator(&local, &cloud);

    let first = migrator
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();
    let after_first = cloud.canonical_bytes();

    let second = migrator
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();

    assert!(first.success && second.success);
    assert_eq!(cloud.canonical_bytes(), after_first, "no duplicates on rerun");
    assert_eq!(first.counts, second.counts);
}

#[test]
fn source_store_is_never_mutated() {
    let local = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let cloud = Arc::new(MemoryStore::new());
    let before = local.canonical_bytes();

    migrator(&local, &cloud)
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();

    assert_eq!(
        local.canonical_bytes(),
        before,
        "repairs apply to the uploaded copy only"
    );
}

#[test]
fn stores_are_closed_after_every_migration() {
    let local = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let cloud = Arc::new(MemoryStore::new());

    migrator(&local, &cloud)
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();

    assert_eq!(local.close_calls(), 1);
    assert_eq!(cloud.close_calls(), 1);
}

#[test]
fn unfixable_game_is_skipped_and_reported_without_losing_the_rest() {
    let mut snapshot = club_snapshot();
    let mut undated = Game::new("g-undated", "U10", "Rovers", date(1));
    undated.date = None;
    snapshot.games.push(undated);
    let local = Arc::new(MemoryStore::from_snapshot(&snapshot));
    let cloud = Arc::new(MemoryStore::new());

    let report = migrator(&local, &cloud)
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();

    // A skipped game is a critical loss, so the run fails loudly, but
    // everything else still lands.
    assert!(!report.success);
    assert!(report.errors.iter().any(|e| e.contains("g-undated")));
    assert_eq!(cloud.contents().games.len(), 2);
    assert_eq!(cloud.contents().players.len(), 3);
}

#[test]
fn round_trip_through_the_cloud_is_lossless() {
    let local = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let cloud = Arc::new(MemoryStore::new());

    let up = migrator(&local, &cloud)
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();
    assert!(up.success);

    let restored = Arc::new(MemoryStore::new());
    let down = migrator(&restored, &cloud)
        .migrate_reverse(ReverseMode::KeepSource, &NullSink)
        .unwrap();
    assert!(down.success, "errors: {:?}", down.errors);

    // Sanitizing already-sanitized data changes nothing, so the copy
    // that comes back is byte-identical to what went up.
    assert_eq!(restored.canonical_bytes(), cloud.canonical_bytes());
}

#[test]
fn delete_source_round_trip_leaves_exactly_one_copy() {
    let cloud = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let local = Arc::new(MemoryStore::new());

    let report = migrator(&local, &cloud)
        .migrate_reverse(ReverseMode::DeleteSource, &NullSink)
        .unwrap();

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(report.destination_cleaned);
    assert!(cloud.contents().is_empty());
    assert_eq!(local.contents().players.len(), 3);
}

/// A sink slow enough that a second caller reliably arrives while the
/// first operation is still in flight.
struct SlowSink;

impl ProgressSink for SlowSink {
    fn report(&self, _event: &ProgressEvent) -> Result<(), ProgressSinkError> {
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    }
}

#[test]
fn concurrent_forward_calls_share_one_upload_pass() {
    let local = Arc::new(MemoryStore::from_snapshot(&club_snapshot()));
    let cloud = Arc::new(MemoryStore::new());
    let migrator = Arc::new(migrator(&local, &cloud));

    let leader = {
        let migrator = Arc::clone(&migrator);
        std::thread::spawn(move || migrator.migrate_forward(ForwardMode::Merge, &SlowSink))
    };
    while !migrator.is_migrating() {
        std::thread::yield_now();
    }
    let joined = migrator
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();
    let led = leader.join().unwrap().unwrap();

    assert_eq!(joined, led, "joiner receives the leader's report");
    // One pass: every upload happened exactly once.
    let expected_writes = led.counts.total();
    assert_eq!(cloud.write_ops(), expected_writes);
}

#[test]
fn hydration_refreshes_stale_records_only() {
    let stale = "2025-01-01T00:00:00Z".parse().unwrap();
    let fresh = "2025-07-01T00:00:00Z".parse().unwrap();

    let cloud = Arc::new(MemoryStore::from_snapshot(&DataSnapshot {
        players: vec![
            Player::new("p1", "Cloud Fresh").with_updated_at(fresh),
            Player::new("p2", "Cloud Stale").with_updated_at(stale),
            Player::new("p3", "Cloud Only"),
        ],
        ..Default::default()
    }));
    let local = Arc::new(MemoryStore::from_snapshot(&DataSnapshot {
        players: vec![
            Player::new("p1", "Local Stale").with_updated_at(stale),
            Player::new("p2", "Local Fresh").with_updated_at(fresh),
        ],
        ..Default::default()
    }));

    let report = migrator(&local, &cloud)
        .hydrate("acct-1", &NullSink)
        .unwrap();

    assert!(report.success);
    assert_eq!(report.written.players, 2); // p1 refreshed + p3 added
    assert_eq!(report.skipped.players, 1); // p2 kept

    let players = local.contents().players;
    assert_eq!(players.len(), 3);
    assert_eq!(players.iter().find(|p| p.id == "p1").unwrap().name, "Cloud Fresh");
    assert_eq!(players.iter().find(|p| p.id == "p2").unwrap().name, "Local Fresh");
}

#[test]
fn session_expiry_mid_upload_keeps_partial_progress() {
    let games: Vec<Game> = (0..20)
        .map(|i| Game::new(format!("g{i:02}"), "U10", "Rovers", date(1)))
        .collect();
    let local = Arc::new(MemoryStore::from_snapshot(&DataSnapshot {
        games,
        ..Default::default()
    }));
    let cloud = Arc::new(MemoryStore::new());
    let auth = Arc::new(StaticAuth::new("acct-1"));
    // Preflight refresh succeeds, the first mid-loop check (game 5) too,
    // the next (game 10) does not.
    auth.fail_after_refreshes(2);

    let migrator = Migrator::new(
        Arc::clone(&local) as Arc<dyn StoreAdapter>,
        Arc::clone(&cloud) as Arc<dyn StoreAdapter>,
        auth,
    )
    .with_config(MigrationConfig::new().with_session_check_interval(5));

    let report = migrator
        .migrate_forward(ForwardMode::Merge, &NullSink)
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.counts.games, 10);
    assert_eq!(cloud.contents().games.len(), 10);
    assert!(report.errors.iter().any(|e| e.contains("re-authenticate")));

    // Retrying after re-auth converges with no duplicates.
    let auth = Arc::new(StaticAuth::new("acct-1"));
    let retry = Migrator::new(
        Arc::clone(&local) as Arc<dyn StoreAdapter>,
        Arc::clone(&cloud) as Arc<dyn StoreAdapter>,
        auth,
    )
    .migrate_forward(ForwardMode::Merge, &NullSink)
    .unwrap();
    assert!(retry.success);
    assert_eq!(cloud.contents().games.len(), 20);
}

mod sanitizer_properties {
    use matchday_migrate::sanitize_snapshot;
    use matchday_model::{DataSnapshot, Player, Team};
    use proptest::prelude::*;

    fn arbitrary_snapshot() -> impl Strategy<Value = DataSnapshot> {
        let player = ("[a-z0-9 ]{0,8}", "[A-Za-z ]{0,12}")
            .prop_map(|(id, name)| Player::new(id, name));
        let team = ("[a-z0-9]{0,6}", "[A-Za-z ]{0,12}", proptest::option::of("[a-z]{1,4}"))
            .prop_map(|(id, name, season)| {
                let mut team = Team::new(id, name);
                team.season_id = season;
                team
            });
        (
            proptest::collection::vec(player, 0..8),
            proptest::collection::vec(team, 0..4),
        )
            .prop_map(|(players, teams)| DataSnapshot {
                players,
                teams,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn sanitizing_is_deterministic(snapshot in arbitrary_snapshot()) {
            let a = sanitize_snapshot(&snapshot);
            let b = sanitize_snapshot(&snapshot);
            prop_assert_eq!(a.snapshot, b.snapshot);
            prop_assert_eq!(a.repairs.len(), b.repairs.len());
            prop_assert_eq!(a.skipped.len(), b.skipped.len());
        }

        #[test]
        fn sanitizing_twice_changes_nothing(snapshot in arbitrary_snapshot()) {
            let once = sanitize_snapshot(&snapshot);
            let twice = sanitize_snapshot(&once.snapshot);
            prop_assert_eq!(&twice.snapshot, &once.snapshot);
            prop_assert!(twice.repairs.is_empty());
            prop_assert!(twice.skipped.is_empty());
        }

        #[test]
        fn clean_ids_always_survive(name in "[A-Za-z]{1,12}") {
            let snapshot = DataSnapshot {
                players: vec![Player::new("p-keep", name)],
                ..Default::default()
            };
            let outcome = sanitize_snapshot(&snapshot);
            prop_assert_eq!(outcome.snapshot.players.len(), 1);
            prop_assert_eq!(outcome.snapshot.players[0].id.as_str(), "p-keep");
        }
    }
}
