//! Forward migration: local store to cloud store.

use crate::auth::{AuthService, NetworkMonitor};
use crate::config::MigrationConfig;
use crate::error::{MigrateError, MigrateResult};
use crate::pipeline::{transfer_snapshot, WritePolicy};
use crate::progress::{MigrationStage, ProgressEvent, ProgressSink, Reporter};
use crate::report::MigrationReport;
use crate::sanitize::sanitize_snapshot;
use crate::store::{export_snapshot, StoreAdapter, StorePair};
use crate::verify::verify_transfer;
use matchday_model::EntityKind;

/// How forward migration treats data already in the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Upsert into whatever the cloud already holds; cloud-only records
    /// survive.
    Merge,
    /// Clear all cloud data for the account first, then upload.
    Replace,
}

/// Runs a forward migration. Only preflight failures (offline, auth,
/// store open) surface as `Err`; everything after preflight folds into
/// the report.
pub(crate) fn run_forward(
    local: &dyn StoreAdapter,
    cloud: &dyn StoreAdapter,
    auth: &dyn AuthService,
    network: &dyn NetworkMonitor,
    config: &MigrationConfig,
    sink: &dyn ProgressSink,
    mode: ForwardMode,
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
    let _pair = StorePair::open(local, cloud).inspect_err(|e| {
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

    reporter.stage(MigrationStage::Exporting);
    let raw = match export_snapshot(local) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            let report =
                MigrationReport::failed(format!("could not export local data: {e}"));
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
            .push("local store produced no migratable data; nothing was uploaded".into());
        emit_final(&reporter, &report);
        return Ok(report);
    }

    if mode == ForwardMode::Replace {
        let skipped_games = outcome
            .skipped
            .iter()
            .filter(|s| s.kind == EntityKind::Game)
            .count();
        if skipped_games > 0 {
            report.errors.push(format!(
                "replace mode refused: {skipped_games} game(s) could not be exported \
                 safely; fix the data or use merge mode"
            ));
            emit_final(&reporter, &report);
            return Ok(report);
        }
        reporter.stage(MigrationStage::Clearing);
        if let Err(e) = cloud.clear_all_user_data() {
            report
                .errors
                .push(format!("could not clear cloud data: {e}; nothing was uploaded"));
            emit_final(&reporter, &report);
            return Ok(report);
        }
        report.destination_cleaned = true;
    }

    // Captured after any pre-clear, so the verification floor reflects
    // what the destination actually held when the upload began.
    let before = match export_snapshot(cloud) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            report
                .errors
                .push(format!("could not read cloud contents before upload: {e}"));
            emit_final(&reporter, &report);
            return Ok(report);
        }
    };

    let transfer = transfer_snapshot(
        &sanitized,
        cloud,
        WritePolicy::Overwrite,
        auth,
        config,
        &reporter,
        MigrationStage::Uploading,
    );
    report.counts = transfer.written.counts().clone();
    report.errors.extend(transfer.errors);
    report.warnings.extend(transfer.warnings);

    if transfer.aborted_auth {
        // The session is gone; a verification read would fail the same
        // way. Partial counts stand, uploads are idempotent upserts.
        emit_final(&reporter, &report);
        return Ok(report);
    }

    reporter.stage(MigrationStage::Verifying);
    let verification = verify_transfer(
        &sanitized,
        &before,
        &transfer.written,
        cloud,
        config.game_content_mismatch_fatal,
    );
    report.errors.extend(verification.errors);
    report.warnings.extend(verification.warnings);

    report.success = report.errors.is_empty() && verification.passed;
    emit_final(&reporter, &report);
    Ok(report)
}

pub(crate) fn emit_final(reporter: &Reporter<'_>, report: &MigrationReport) {
    if report.success {
        reporter.stage(MigrationStage::Complete);
    } else {
        let mut event = ProgressEvent::at_stage(MigrationStage::Error);
        if let Some(first) = report.errors.first() {
            event = event.with_error(first.clone());
        }
        reporter.emit(event);
    }
}
