//! Error types for the migration engine.
//!
//! Only preflight failures (offline network, unrefreshable session, a
//! store that cannot be opened) surface as `Err` from the public
//! operations. Everything after preflight is captured into the final
//! report's `errors`/`warnings` lists instead, so callers always get a
//! structured result once the operation has started touching data.

use thiserror::Error;

/// Result type for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Preflight errors that abort a migration before any state is touched.
///
/// Clone is required: concurrent callers that join an in-flight operation
/// receive a clone of the leader's outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MigrateError {
    /// The network is unreachable; nothing was attempted.
    #[error("network is offline; connect and retry")]
    Offline,

    /// The session could not be refreshed; nothing was attempted.
    #[error("authentication failed: {0}; re-authenticate and retry")]
    Authentication(String),

    /// A store could not be opened for the operation.
    #[error("store could not be opened: {0}")]
    StoreUnavailable(String),
}

impl MigrateError {
    /// Creates an authentication error from anything displayable.
    pub fn auth(message: impl std::fmt::Display) -> Self {
        MigrateError::Authentication(message.to_string())
    }

    /// Creates a store-unavailable error from anything displayable.
    pub fn store(message: impl std::fmt::Display) -> Self {
        MigrateError::StoreUnavailable(message.to_string())
    }

    /// Returns true if the caller should re-authenticate before retrying.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, MigrateError::Authentication(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert!(MigrateError::Offline.to_string().contains("offline"));
        let err = MigrateError::auth("token expired");
        assert!(err.to_string().contains("re-authenticate"));
        assert!(err.needs_reauth());
        assert!(!MigrateError::Offline.needs_reauth());
    }
}
