//! Identity helpers shared by every keyed entity.

use chrono::{DateTime, Utc};

/// Returns true if an ID is unusable as a key (empty or whitespace-only).
pub fn is_blank_id(id: &str) -> bool {
    id.trim().is_empty()
}

/// Common identity surface for keyed entities.
///
/// Lets the verification engine and the freshness-aware hydration path
/// operate generically over entity slices instead of repeating per-type
/// loops.
pub trait Identified {
    /// The caller-assigned, migration-stable ID.
    fn id(&self) -> &str;

    /// Last modification time, if the source recorded one.
    fn updated_at(&self) -> Option<DateTime<Utc>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids() {
        assert!(is_blank_id(""));
        assert!(is_blank_id("   "));
        assert!(is_blank_id("\t\n"));
        assert!(!is_blank_id("p1"));
        assert!(!is_blank_id(" p1 "));
    }
}
