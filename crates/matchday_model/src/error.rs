//! Error types for the data model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur when working with model types.
#[derive(Debug, Error)]
pub enum ModelError {
    /// A snapshot could not be encoded to JSON.
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// An entity carried an ID that is unusable as a key.
    #[error("invalid entity id: {0:?}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ModelError::InvalidId("  ".into());
        assert!(err.to_string().contains("invalid entity id"));
    }
}
