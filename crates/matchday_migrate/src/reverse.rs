//! Reverse migration (cloud to local) and hydration.
//!
//! Reverse migration copies the verified cloud dataset into the local
//! store and flips the active backend; delete-source mode additionally
//! clears the cloud afterwards, gated on verification so the only
//! complete copy is never deleted. Hydration is a gentler pass: a
//! freshness merge into the local store that never deletes anything.

use crate::auth::{AuthService, NetworkMonitor};
use crate::config::MigrationConfig;
use crate::error::{MigrateError, MigrateResult};
use crate::forward::emit_final;
use crate::pipeline::{transfer_snapshot, WritePolicy};
use crate::progress::{MigrationStage, ProgressEvent, ProgressSink, Reporter};
use crate::report::{HydrationReport, MigrationReport};
use crate::sanitize::sanitize_snapshot;
use crate::store::{export_snapshot, StoreAdapter, StorePair};
use crate::verify::{verify_hydration, verify_transfer};
use matchday_model::BackendKind;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// What happens to the cloud copy after a verified reverse migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverseMode {
    /// Leave the cloud data in place; both stores hold the dataset.
    KeepSource,
    /// Clear the cloud copy once the local copy has been verified.
    DeleteSource,
}

/// Failure to flip the active backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not switch active backend: {0}")]
pub struct SwitchError(pub String);

/// The application seam that records which store the app reads from.
pub trait BackendSwitch: Send + Sync {
    /// Makes `backend` the active store for subsequent app reads.
    fn set_active_backend(&self, backend: BackendKind) -> Result<(), SwitchError>;
}

/// An in-memory switch with failure injection.
#[derive(Debug)]
pub struct MemorySwitch {
    active: Mutex<BackendKind>,
    fail: AtomicBool,
}

impl MemorySwitch {
    /// Creates a switch pointing at the given backend.
    pub fn new(active: BackendKind) -> Self {
        Self {
            active: Mutex::new(active),
            fail: AtomicBool::new(false),
        }
    }

    /// Currently active backend.
    pub fn active(&self) -> BackendKind {
        *self.active.lock()
    }

    /// Makes every switch attempt fail.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

impl BackendSwitch for MemorySwitch {
    fn set_active_backend(&self, backend: BackendKind) -> Result<(), SwitchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SwitchError("settings store rejected the write".into()));
        }
        *self.active.lock() = backend;
        Ok(())
    }
}

/// Runs a reverse migration. Preflight failures surface as `Err`,
/// everything after folds into the report.
#[allow(clippy::too_many_arguments)]
pub(crate) fn run_reverse(
    cloud: &dyn StoreAdapter,
    local: &dyn StoreAdapter,
    auth: &dyn AuthService,
    network: &dyn NetworkMonitor,
    switch: &dyn BackendSwitch,
    config: &MigrationConfig,
    sink: &dyn ProgressSink,
    mode: ReverseMode,
) -> MigrateResult<MigrationReport> {
    let reporter = Reporter::new(sink);
    reporter.stage(MigrationStage::Preparing);

    if !network.is_online() {
        let error = MigrateError::Offline;
        reporter.emit(
            ProgressEvent::at_stage(MigrationStage::Error).with_error(error.to_string()),
        );
        return Err(error);
    }
    let _pair = StorePair::open(cloud, local).inspect_err(|e| {
        reporter
            .emit(ProgressEvent::at_stage(MigrationStage::Error).with_error(e.to_string()));
    })?;
    if let Err(e) = auth.refresh_session() {
        let error = MigrateError::auth(e);
        reporter.emit(
            ProgressEvent::at_stage(MigrationStage::Error).with_error(error.to_string()),
        );
        return Err(error);
    }

    let mut report = MigrationReport::default();

    reporter.stage(MigrationStage::Downloading);
    let raw = match export_snapshot(cloud) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let report =
                MigrationReport::failed(format!("could not download cloud data: {e}"));
            emit_final(&reporter, &report);
            return Ok(report);
        }
    };

    reporter.stage(MigrationStage::Validating);
    let outcome = sanitize_snapshot(&raw);
    for repair in &outcome.repairs {
        report.warnings.push(repair.message());
    }
    for skipped in &outcome.skipped {
        if skipped.kind.is_critical() {
            report.errors.push(skipped.message());
        } else {
            report.warnings.push(skipped.message());
        }
    }
    let sanitized = outcome.snapshot;

    if sanitized.is_empty() {
        report
            .errors
            .push("cloud store produced no migratable data; nothing was saved".into());
        emit_final(&reporter, &report);
        return Ok(report);
    }

    let before = match export_snapshot(local) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            report
                .errors
                .push(format!("could not read local contents before saving: {e}"));
            emit_final(&reporter, &report);
            return Ok(report);
        }
    };

    let transfer = transfer_snapshot(
        &sanitized,
        local,
        WritePolicy::Overwrite,
        auth,
        config,
        &reporter,
        MigrationStage::Saving,
    );
    report.counts = transfer.written.counts().clone();
    report.errors.extend(transfer.errors);
    report.warnings.extend(transfer.warnings);

    if transfer.aborted_auth {
        emit_final(&reporter, &report);
        return Ok(report);
    }

    reporter.stage(MigrationStage::Verifying);
    let verification = verify_transfer(
        &sanitized,
        &before,
        &transfer.written,
        local,
        config.game_content_mismatch_fatal,
    );
    report.errors.extend(verification.errors);
    report.warnings.extend(verification.warnings);
    report.success = report.errors.is_empty() && verification.passed;

    // The backend flip happens before any deletion: if the app cannot be
    // pointed at the local copy, the cloud copy must stay.
    if report.success {
        if let Err(e) = switch.set_active_backend(BackendKind::Local) {
            report.errors.push(format!(
                "local copy is verified but the app could not be switched to it: {e}"
            ));
            report.success = false;
        }
    }

    if report.success && mode == ReverseMode::DeleteSource {
        reporter.stage(MigrationStage::Deleting);
        match cloud.clear_all_user_data() {
            Ok(()) => report.destination_cleaned = true,
            Err(e) => {
                // Degraded, not failed: the verified local copy stands
                // and the leftover cloud data can be cleared later.
                report.warnings.push(format!(
                    "cloud cleanup failed after a verified copy: {e}; \
                     data remains in both stores"
                ));
            }
        }
    }

    emit_final(&reporter, &report);
    Ok(report)
}

/// Refreshes the local store from the cloud without deleting anything:
/// a record is overwritten only when the cloud copy is strictly newer.
pub(crate) fn run_hydrate(
    cloud: &dyn StoreAdapter,
    local: &dyn StoreAdapter,
    auth: &dyn AuthService,
    network: &dyn NetworkMonitor,
    config: &MigrationConfig,
    sink: &dyn ProgressSink,
    account_id: &str,
) -> MigrateResult<HydrationReport> {
    let reporter = Reporter::new(sink);
    reporter.stage(MigrationStage::Preparing);

    if !network.is_online() {
        let error = MigrateError::Offline;
        reporter.emit(
            ProgressEvent::at_stage(MigrationStage::Error).with_error(error.to_string()),
        );
        return Err(error);
    }
    let _pair = StorePair::open(cloud, local).inspect_err(|e| {
        reporter
            .emit(ProgressEvent::at_stage(MigrationStage::Error).with_error(e.to_string()));
    })?;
    let session = match auth.refresh_session() {
        Ok(session) => session,
        Err(e) => {
            let error = MigrateError::auth(e);
            reporter.emit(
                ProgressEvent::at_stage(MigrationStage::Error).with_error(error.to_string()),
            );
            return Err(error);
        }
    };
    if session.account_id != account_id {
        let error = MigrateError::auth(format!(
            "signed-in account {} does not match the requested account",
            session.account_id
        ));
        reporter.emit(
            ProgressEvent::at_stage(MigrationStage::Error).with_error(error.to_string()),
        );
        return Err(error);
    }

    let mut report = HydrationReport::default();

    reporter.stage(MigrationStage::Downloading);
    let raw = match export_snapshot(cloud) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            reporter.stage(MigrationStage::Error);
            return Ok(HydrationReport::failed(format!(
                "could not download cloud data: {e}"
            )));
        }
    };

    reporter.stage(MigrationStage::Validating);
    let outcome = sanitize_snapshot(&raw);
    for repair in &outcome.repairs {
        report.warnings.push(repair.message());
    }
    for skipped in &outcome.skipped {
        if skipped.kind.is_critical() {
            report.errors.push(skipped.message());
        } else {
            report.warnings.push(skipped.message());
        }
    }
    let sanitized = outcome.snapshot;

    let existing = match export_snapshot(local) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            reporter.stage(MigrationStage::Error);
            return Ok(HydrationReport::failed(format!(
                "could not read local contents before hydrating: {e}"
            )));
        }
    };

    let transfer = transfer_snapshot(
        &sanitized,
        local,
        WritePolicy::IfNewer {
            existing: &existing,
        },
        auth,
        config,
        &reporter,
        MigrationStage::Saving,
    );
    report.written = transfer.written.counts().clone();
    report.skipped = transfer.skipped_fresh;
    report.errors.extend(transfer.errors);
    report.warnings.extend(transfer.warnings);

    if transfer.aborted_auth {
        report.success = false;
        reporter.stage(MigrationStage::Error);
        return Ok(report);
    }

    reporter.stage(MigrationStage::Verifying);
    let verification = verify_hydration(
        &sanitized,
        &existing,
        &transfer.written,
        local,
        config.game_content_mismatch_fatal,
    );
    report.errors.extend(verification.errors);
    report.warnings.extend(verification.warnings);

    report.success = report.errors.is_empty() && verification.passed;
    if report.success {
        reporter.stage(MigrationStage::Complete);
    } else {
        reporter.stage(MigrationStage::Error);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AlwaysOnline, MemoryNetwork, StaticAuth};
    use crate::progress::{CollectingSink, NullSink};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use matchday_model::{DataSnapshot, Game, Player, Season, Team};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 3).unwrap()
    }

    fn seeded_cloud() -> MemoryStore {
        MemoryStore::from_snapshot(&DataSnapshot {
            players: vec![Player::new("p1", "Alex")],
            seasons: vec![Season::new("s1", "Spring 2025")],
            teams: vec![Team::new("t1", "U10").with_season("s1")],
            games: vec![Game::new("g1", "U10", "Rovers", date())],
            ..Default::default()
        })
    }

    fn run(
        cloud: &MemoryStore,
        local: &MemoryStore,
        switch: &MemorySwitch,
        mode: ReverseMode,
    ) -> MigrateResult<MigrationReport> {
        let auth = StaticAuth::new("acct-1");
        run_reverse(
            cloud,
            local,
            &auth,
            &AlwaysOnline,
            switch,
            &MigrationConfig::new(),
            &NullSink,
            mode,
        )
    }

    #[test]
    fn keep_source_copies_and_switches() {
        let cloud = seeded_cloud();
        let local = MemoryStore::new();
        let switch = MemorySwitch::new(BackendKind::Cloud);

        let report = run(&cloud, &local, &switch, ReverseMode::KeepSource).unwrap();

        assert!(report.success, "errors: {:?}", report.errors);
        assert_eq!(local.contents().players.len(), 1);
        assert_eq!(switch.active(), BackendKind::Local);
        assert!(!report.destination_cleaned);
        assert_eq!(cloud.clear_calls(), 0);
    }

    #[test]
    fn delete_source_clears_cloud_after_verification() {
        let cloud = seeded_cloud();
        let local = MemoryStore::new();
        let switch = MemorySwitch::new(BackendKind::Cloud);

        let report = run(&cloud, &local, &switch, ReverseMode::DeleteSource).unwrap();

        assert!(report.success);
        assert!(report.destination_cleaned);
        assert_eq!(cloud.clear_calls(), 1);
        assert!(cloud.contents().players.is_empty());
        assert_eq!(local.contents().players.len(), 1);
    }

    #[test]
    fn failed_verification_blocks_deletion_and_switch() {
        let cloud = seeded_cloud();
        let local = MemoryStore::new();
        local.fail_writes_for("p1"); // critical write failure
        let switch = MemorySwitch::new(BackendKind::Cloud);

        let report = run(&cloud, &local, &switch, ReverseMode::DeleteSource).unwrap();

        assert!(!report.success);
        assert_eq!(cloud.clear_calls(), 0, "source must survive a failed copy");
        assert_eq!(switch.active(), BackendKind::Cloud);
    }

    #[test]
    fn switch_failure_blocks_deletion() {
        let cloud = seeded_cloud();
        let local = MemoryStore::new();
        let switch = MemorySwitch::new(BackendKind::Cloud);
        switch.set_failing(true);

        let report = run(&cloud, &local, &switch, ReverseMode::DeleteSource).unwrap();

        assert!(!report.success);
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("could not be switched")));
        assert_eq!(cloud.clear_calls(), 0);
    }

    #[test]
    fn cleanup_failure_degrades_to_warning() {
        let cloud = seeded_cloud();
        cloud.set_fail_clear(true);
        let local = MemoryStore::new();
        let switch = MemorySwitch::new(BackendKind::Cloud);

        let report = run(&cloud, &local, &switch, ReverseMode::DeleteSource).unwrap();

        assert!(report.success, "cleanup failure must not fail the migration");
        assert!(!report.destination_cleaned);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("data remains in both stores")));
        assert_eq!(switch.active(), BackendKind::Local);
    }

    #[test]
    fn hydrate_overwrites_only_stale_local_records() {
        let older = "2025-01-01T00:00:00Z".parse().unwrap();
        let newer = "2025-06-01T00:00:00Z".parse().unwrap();
        let cloud = MemoryStore::from_snapshot(&DataSnapshot {
            players: vec![
                Player::new("p1", "Cloud Newer").with_updated_at(newer),
                Player::new("p2", "Cloud Older").with_updated_at(older),
            ],
            ..Default::default()
        });
        let local = MemoryStore::from_snapshot(&DataSnapshot {
            players: vec![
                Player::new("p1", "Local Older").with_updated_at(older),
                Player::new("p2", "Local Newer").with_updated_at(newer),
            ],
            ..Default::default()
        });
        let auth = StaticAuth::new("acct-1");

        let report = run_hydrate(
            &cloud,
            &local,
            &auth,
            &AlwaysOnline,
            &MigrationConfig::new(),
            &NullSink,
            "acct-1",
        )
        .unwrap();

        assert!(report.success);
        assert_eq!(report.written.players, 1);
        assert_eq!(report.skipped.players, 1);
        let players = local.contents().players;
        assert_eq!(
            players.iter().find(|p| p.id == "p1").unwrap().name,
            "Cloud Newer"
        );
        assert_eq!(
            players.iter().find(|p| p.id == "p2").unwrap().name,
            "Local Newer"
        );
    }

    #[test]
    fn offline_preflight_delivers_terminal_error_event() {
        let cloud = seeded_cloud();
        let local = MemoryStore::new();
        let switch = MemorySwitch::new(BackendKind::Cloud);
        let auth = StaticAuth::new("acct-1");
        let network = MemoryNetwork::new(false);
        let sink = CollectingSink::new();

        let result = run_reverse(
            &cloud,
            &local,
            &auth,
            &network,
            &switch,
            &MigrationConfig::new(),
            &sink,
            ReverseMode::KeepSource,
        );

        assert!(matches!(result, Err(MigrateError::Offline)));
        assert_eq!(sink.stages().last(), Some(&MigrationStage::Error));
        assert!(sink.events().last().unwrap().error.is_some());
    }

    #[test]
    fn hydrate_auth_preflight_delivers_terminal_error_event() {
        let cloud = seeded_cloud();
        let local = MemoryStore::new();
        let auth = StaticAuth::new("acct-1");
        auth.set_failing(true);
        let sink = CollectingSink::new();

        let result = run_hydrate(
            &cloud,
            &local,
            &auth,
            &AlwaysOnline,
            &MigrationConfig::new(),
            &sink,
            "acct-1",
        );

        assert!(matches!(result, Err(MigrateError::Authentication(_))));
        assert_eq!(sink.stages().last(), Some(&MigrationStage::Error));
    }

    #[test]
    fn hydrate_fails_when_a_write_is_silently_dropped() {
        let cloud = MemoryStore::from_snapshot(&DataSnapshot {
            players: vec![Player::new("p1", "Cloud")],
            ..Default::default()
        });
        let local = MemoryStore::new();
        local.drop_writes_for("p1");
        let auth = StaticAuth::new("acct-1");

        let report = run_hydrate(
            &cloud,
            &local,
            &auth,
            &AlwaysOnline,
            &MigrationConfig::new(),
            &NullSink,
            "acct-1",
        )
        .unwrap();

        assert!(!report.success);
        assert_eq!(report.written.players, 1, "the adapter claimed success");
        assert!(report
            .errors
            .iter()
            .any(|e| e.contains("missing in the destination")));
    }

    #[test]
    fn hydrate_rejects_account_mismatch() {
        let cloud = seeded_cloud();
        let local = MemoryStore::new();
        let auth = StaticAuth::new("acct-other");

        let result = run_hydrate(
            &cloud,
            &local,
            &auth,
            &AlwaysOnline,
            &MigrationConfig::new(),
            &NullSink,
            "acct-1",
        );
        assert!(matches!(result, Err(MigrateError::Authentication(_))));
        assert_eq!(local.contents().counts().total(), 0);
    }

    #[test]
    fn hydrate_never_deletes_local_only_records() {
        let cloud = MemoryStore::from_snapshot(&DataSnapshot {
            players: vec![Player::new("p1", "Cloud")],
            ..Default::default()
        });
        let local = MemoryStore::from_snapshot(&DataSnapshot {
            players: vec![Player::new("local-only", "Mine")],
            ..Default::default()
        });
        let auth = StaticAuth::new("acct-1");

        let report = run_hydrate(
            &cloud,
            &local,
            &auth,
            &AlwaysOnline,
            &MigrationConfig::new(),
            &NullSink,
            "acct-1",
        )
        .unwrap();

        assert!(report.success);
        let ids: Vec<String> = local.contents().players.into_iter().map(|p| p.id).collect();
        assert!(ids.contains(&"local-only".to_string()));
        assert!(ids.contains(&"p1".to_string()));
    }
}
