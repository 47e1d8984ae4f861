//! # Matchday Migrate
//!
//! Bidirectional migration engine between a coach's local-first store and
//! a cloud store.
//!
//! This crate provides:
//! - Forward migration (local → cloud) in merge or replace mode
//! - Reverse migration (cloud → local) with optional source deletion,
//!   gated on verification
//! - Hydration: a freshness merge that refreshes local data from the
//!   cloud without deleting anything
//! - A sanitizer that repairs or quarantines malformed entities before
//!   any write
//! - Post-transfer verification by identity, count and game content
//! - A single-flight guard so concurrent same-direction calls share one
//!   operation and one outcome
//!
//! ## Architecture
//!
//! Every operation follows the same shape: preflight (connectivity,
//! store open, session), export, sanitize, transfer in dependency order,
//! verify. Stores are behind the [`StoreAdapter`] seam; auth, network
//! and the active-backend switch are seams too, so the engine is fully
//! testable in memory.
//!
//! ## Key Invariants
//!
//! - The source store is never mutated by a migration (delete-source
//!   cleanup runs only after the copy is verified)
//! - IDs are carried verbatim; migration never re-keys
//! - All writes are idempotent upserts; a failed run can simply be
//!   retried
//! - Only preflight failures surface as `Err`; everything else folds
//!   into the report

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod error;
mod forward;
mod guard;
mod pipeline;
mod progress;
mod report;
mod reverse;
mod sanitize;
mod store;
mod verify;

pub use auth::{AlwaysOnline, AuthError, AuthService, MemoryNetwork, NetworkMonitor, Session, StaticAuth};
pub use config::MigrationConfig;
pub use error::{MigrateError, MigrateResult};
pub use forward::ForwardMode;
pub use guard::SingleFlight;
pub use progress::{
    CollectingSink, MigrationStage, NullSink, ProgressEvent, ProgressSink, ProgressSinkError,
};
pub use report::{HydrationReport, MigrationReport, SourceDataCheck};
pub use reverse::{BackendSwitch, MemorySwitch, ReverseMode, SwitchError};
pub use sanitize::{
    sanitize_snapshot, Repair, SanitizeOutcome, SkippedEntity, DEFAULT_COMPETITION_NAME,
    DEFAULT_OPPONENT_NAME, DEFAULT_PERIOD_COUNT, DEFAULT_PERIOD_DURATION_MIN,
    DEFAULT_PERSONNEL_NAME, DEFAULT_PLAYER_NAME, DEFAULT_TEAM_NAME, MAX_TEXT_LEN,
};
pub use store::{
    export_snapshot, read_counts, MemoryStore, StoreAdapter, StoreError, StoreResult,
};
pub use verify::{
    verify_hydration, verify_transfer, MissingEntity, VerificationReport, WrittenLedger,
};

use matchday_model::{BackendKind, EntityCounts};
use std::sync::Arc;

/// The migration engine facade.
///
/// Holds the two stores and the collaborator seams, and serializes
/// operations per direction: a second forward migration started while
/// one is running joins it and receives the same report.
pub struct Migrator {
    local: Arc<dyn StoreAdapter>,
    cloud: Arc<dyn StoreAdapter>,
    auth: Arc<dyn AuthService>,
    network: Arc<dyn NetworkMonitor>,
    switch: Arc<dyn BackendSwitch>,
    config: MigrationConfig,
    forward_flight: SingleFlight<MigrateResult<MigrationReport>>,
    reverse_flight: SingleFlight<MigrateResult<MigrationReport>>,
    hydrate_flight: SingleFlight<MigrateResult<HydrationReport>>,
}

impl Migrator {
    /// Creates a migrator over the given stores and auth service, with
    /// an always-online network monitor and an in-memory backend switch.
    pub fn new(
        local: Arc<dyn StoreAdapter>,
        cloud: Arc<dyn StoreAdapter>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        Self {
            local,
            cloud,
            auth,
            network: Arc::new(AlwaysOnline),
            switch: Arc::new(MemorySwitch::new(BackendKind::Cloud)),
            config: MigrationConfig::new(),
            forward_flight: SingleFlight::new(),
            reverse_flight: SingleFlight::new(),
            hydrate_flight: SingleFlight::new(),
        }
    }

    /// Replaces the network monitor.
    pub fn with_network(mut self, network: Arc<dyn NetworkMonitor>) -> Self {
        self.network = network;
        self
    }

    /// Replaces the active-backend switch.
    pub fn with_backend_switch(mut self, switch: Arc<dyn BackendSwitch>) -> Self {
        self.switch = switch;
        self
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: MigrationConfig) -> Self {
        self.config = config;
        self
    }

    /// Migrates local data to the cloud. Progress goes to `sink`; when a
    /// forward migration is already running, this call joins it (the
    /// running operation's sink keeps receiving events, not `sink`).
    pub fn migrate_forward(
        &self,
        mode: ForwardMode,
        sink: &dyn ProgressSink,
    ) -> MigrateResult<MigrationReport> {
        self.forward_flight.run(|| {
            forward::run_forward(
                self.local.as_ref(),
                self.cloud.as_ref(),
                self.auth.as_ref(),
                self.network.as_ref(),
                &self.config,
                sink,
                mode,
            )
        })
    }

    /// Migrates cloud data to the local store and switches the app to
    /// it. Joins an already-running reverse migration if there is one.
    pub fn migrate_reverse(
        &self,
        mode: ReverseMode,
        sink: &dyn ProgressSink,
    ) -> MigrateResult<MigrationReport> {
        self.reverse_flight.run(|| {
            reverse::run_reverse(
                self.cloud.as_ref(),
                self.local.as_ref(),
                self.auth.as_ref(),
                self.network.as_ref(),
                self.switch.as_ref(),
                &self.config,
                sink,
                mode,
            )
        })
    }

    /// Refreshes the local store from the cloud for `account_id`,
    /// overwriting only records the cloud holds a strictly newer copy
    /// of. Joins an already-running hydration if there is one.
    pub fn hydrate(
        &self,
        account_id: &str,
        sink: &dyn ProgressSink,
    ) -> MigrateResult<HydrationReport> {
        self.hydrate_flight.run(|| {
            reverse::run_hydrate(
                self.cloud.as_ref(),
                self.local.as_ref(),
                self.auth.as_ref(),
                self.network.as_ref(),
                &self.config,
                sink,
                account_id,
            )
        })
    }

    /// Whether any migration is currently running.
    pub fn is_migrating(&self) -> bool {
        self.forward_flight.is_in_flight() || self.reverse_flight.is_in_flight()
    }

    /// Asks whether the local store holds any data. Never raises: a
    /// failed check is reported in the result itself.
    pub fn check_source_has_data(&self) -> SourceDataCheck {
        match self.source_summary() {
            Ok(counts) => SourceDataCheck {
                has_data: counts.total() > 0,
                check_failed: false,
                error: None,
            },
            Err(e) => SourceDataCheck {
                has_data: false,
                check_failed: true,
                error: Some(e.to_string()),
            },
        }
    }

    /// Per-kind entity counts in the local store.
    pub fn source_summary(&self) -> MigrateResult<EntityCounts> {
        self.local.initialize().map_err(MigrateError::store)?;
        let counts = read_counts(self.local.as_ref()).map_err(MigrateError::store);
        if let Err(e) = self.local.close() {
            tracing::warn!(error = %e, "local close failed after count read");
        }
        counts
    }
}
