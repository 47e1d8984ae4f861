//! Configuration for migration operations.

/// Configuration for a [`crate::Migrator`].
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// How many games are written between session re-validations during
    /// the long game loop. A migration can run for minutes; an expired
    /// token mid-transfer must stop the operation rather than silently
    /// drop data.
    pub session_check_interval: usize,

    /// Whether a game whose embedded event or available-player counts
    /// differ between source and destination fails verification outright.
    ///
    /// Defaults to true: delete-source mode gates cloud deletion on
    /// verification, and a lenient content check could approve deleting
    /// the only complete copy of a game.
    pub game_content_mismatch_fatal: bool,
}

impl MigrationConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            session_check_interval: 25,
            game_content_mismatch_fatal: true,
        }
    }

    /// Sets the session re-validation interval (in games).
    pub fn with_session_check_interval(mut self, interval: usize) -> Self {
        self.session_check_interval = interval.max(1);
        self
    }

    /// Sets whether game content mismatches fail verification.
    pub fn with_game_content_mismatch_fatal(mut self, fatal: bool) -> Self {
        self.game_content_mismatch_fatal = fatal;
        self
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self::new()
    }
}
