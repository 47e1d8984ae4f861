//! # Matchday Model
//!
//! Entity data model for the Matchday migration engine.
//!
//! This crate provides:
//! - Typed entities for a coach's dataset (players, teams, seasons,
//!   tournaments, games, stat adjustments, warm-up plan, settings)
//! - `DataSnapshot`, a full export of one store's contents
//! - `EntityKind`, the canonical entity categories with their dependency
//!   order and criticality classification
//!
//! All entity IDs are stable, caller-assigned strings. Migration is an
//! identity-preserving copy: IDs are carried verbatim, never re-keyed.
//!
//! ## Key Invariants
//!
//! - Enum-valued fields decode leniently (`Unknown` fallback variants) so
//!   malformed source data survives decoding and can be repaired downstream
//!   instead of failing the whole export
//! - `updated_at` is optional everywhere; freshness comparisons must treat
//!   a missing timestamp as "do not overwrite"

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adjustment;
mod documents;
mod error;
mod game;
mod ids;
mod player;
mod season;
mod snapshot;
mod team;

pub use adjustment::PlayerStatAdjustment;
pub use documents::{AppSettings, BackendKind, WarmupPlan, WarmupStep};
pub use error::{ModelError, ModelResult};
pub use game::{EventKind, Game, GameEvent, GameStatus, HomeAway, PlayerSnapshot};
pub use ids::{is_blank_id, Identified};
pub use player::{Personnel, Player};
pub use season::{Season, Tournament};
pub use snapshot::{DataSnapshot, EntityCounts, EntityKind};
pub use team::{Team, TeamRoster};
