//! Staged progress reporting.
//!
//! Progress events are delivered to a caller-supplied sink. A failing
//! sink must never abort the migration: the emitter logs the failure and
//! keeps going. Only the caller that initiated the in-flight operation
//! receives events; concurrent joiners get the final result only (that is
//! a property of the single-flight guard, which runs the operation, and
//! therefore the sink, exclusively on the leader).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The stages a migration moves through, in order. Forward migrations use
/// `Exporting`/`Uploading`; reverse migrations and hydration use
/// `Downloading`/`Saving`. `Clearing` and `Deleting` only occur in
/// replace and delete-source modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MigrationStage {
    /// Preflight: connectivity, store open, session refresh.
    Preparing,
    /// Reading the local source snapshot.
    Exporting,
    /// Reading the cloud source snapshot.
    Downloading,
    /// Sanitizing and validating the snapshot.
    Validating,
    /// Clearing destination data (forward replace mode only).
    Clearing,
    /// Writing entities to the cloud.
    Uploading,
    /// Writing entities to the local store.
    Saving,
    /// Post-write reconciliation.
    Verifying,
    /// Deleting the cloud copy (reverse delete-source mode only).
    Deleting,
    /// Operation finished successfully.
    Complete,
    /// Operation finished with a blocking failure.
    Error,
}

impl MigrationStage {
    /// Baseline percentage when this stage begins.
    pub fn base_percent(&self) -> u8 {
        match self {
            MigrationStage::Preparing => 0,
            MigrationStage::Exporting | MigrationStage::Downloading => 5,
            MigrationStage::Validating => 25,
            MigrationStage::Clearing => 30,
            MigrationStage::Uploading | MigrationStage::Saving => 35,
            MigrationStage::Verifying => 90,
            MigrationStage::Deleting => 97,
            MigrationStage::Complete | MigrationStage::Error => 100,
        }
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Current stage.
    pub stage: MigrationStage,
    /// Overall progress, 0–100, monotonic within one operation.
    pub percent: u8,
    /// Label of the entity type being processed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_entity: Option<String>,
    /// Free-text detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error text, only on `Error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Creates a bare event at a stage's baseline percentage.
    pub fn at_stage(stage: MigrationStage) -> Self {
        Self {
            stage,
            percent: stage.base_percent(),
            current_entity: None,
            message: None,
            error: None,
        }
    }

    /// Sets an explicit percentage.
    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent = percent.min(100);
        self
    }

    /// Sets the current entity label.
    pub fn with_entity(mut self, label: impl Into<String>) -> Self {
        self.current_entity = Some(label.into());
        self
    }

    /// Sets a detail message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets error text.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Error a progress sink may return; the engine logs and discards it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("progress sink rejected event: {0}")]
pub struct ProgressSinkError(pub String);

/// Caller-supplied progress consumer.
pub trait ProgressSink: Send + Sync {
    /// Receives one event. Returning an error never affects the
    /// migration; it is logged and dropped.
    fn report(&self, event: &ProgressEvent) -> Result<(), ProgressSinkError>;
}

/// A sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _event: &ProgressEvent) -> Result<(), ProgressSinkError> {
        Ok(())
    }
}

/// A sink that records every event, with optional injected failure.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: parking_lot::Mutex<Vec<ProgressEvent>>,
    fail: std::sync::atomic::AtomicBool,
}

impl CollectingSink {
    /// Creates an empty collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `report` return an error.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// All events recorded so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    /// Stages seen so far, in order.
    pub fn stages(&self) -> Vec<MigrationStage> {
        self.events.lock().iter().map(|e| e.stage).collect()
    }
}

impl ProgressSink for CollectingSink {
    fn report(&self, event: &ProgressEvent) -> Result<(), ProgressSinkError> {
        self.events.lock().push(event.clone());
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ProgressSinkError("injected sink failure".into()));
        }
        Ok(())
    }
}

/// Internal emitter wrapping the caller's sink. Sink failures are logged
/// once per event and never propagated.
pub(crate) struct Reporter<'a> {
    sink: &'a dyn ProgressSink,
}

impl<'a> Reporter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink }
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        tracing::debug!(stage = ?event.stage, percent = event.percent, entity = ?event.current_entity, "progress");
        if let Err(e) = self.sink.report(&event) {
            tracing::warn!(error = %e, stage = ?event.stage, "progress sink failed; continuing");
        }
    }

    pub(crate) fn stage(&self, stage: MigrationStage) {
        tracing::info!(stage = ?stage, "stage change");
        self.emit(ProgressEvent::at_stage(stage));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_percentages_monotonic() {
        let stages = [
            MigrationStage::Preparing,
            MigrationStage::Exporting,
            MigrationStage::Validating,
            MigrationStage::Clearing,
            MigrationStage::Uploading,
            MigrationStage::Verifying,
            MigrationStage::Deleting,
            MigrationStage::Complete,
        ];
        let mut last = 0;
        for stage in stages {
            assert!(stage.base_percent() >= last);
            last = stage.base_percent();
        }
    }

    #[test]
    fn event_builder_caps_percent() {
        let event = ProgressEvent::at_stage(MigrationStage::Uploading)
            .with_percent(150)
            .with_entity("games")
            .with_message("42 of 97");
        assert_eq!(event.percent, 100);
        assert_eq!(event.current_entity.as_deref(), Some("games"));
    }

    #[test]
    fn reporter_swallows_sink_failure() {
        let sink = CollectingSink::new();
        sink.set_failing(true);
        let reporter = Reporter::new(&sink);
        // Must not panic or propagate.
        reporter.stage(MigrationStage::Preparing);
        reporter.stage(MigrationStage::Complete);
        assert_eq!(sink.events().len(), 2);
    }
}
