//! Limits and fixed parameters for the trivia engine
//!
//! This module contains the constants that bound question content, quiz
//! length and round behaviour. Values that operators are expected to tune
//! live in [`crate::config::Options`] instead.

/// Round behaviour constants
pub mod round {
    /// Number of correct answers that closes a round automatically
    pub const CAPACITY: usize = 3;
    /// Minimum number of choices offered for a question
    pub const MIN_CHOICE_COUNT: usize = 2;
    /// Maximum number of choices offered for a question
    pub const MAX_CHOICE_COUNT: usize = 8;
}

/// Question content constants
pub mod question {
    /// Maximum length of a question text in characters
    pub const MAX_TEXT_LENGTH: usize = 500;
    /// Maximum length of a single choice in characters
    pub const MAX_CHOICE_LENGTH: usize = 200;
    /// Maximum length of a category label in characters
    pub const MAX_CATEGORY_LENGTH: usize = 100;
    /// Minimum number of incorrect choices stored with a question
    pub const MIN_DISTRACTOR_COUNT: usize = super::round::MIN_CHOICE_COUNT - 1;
    /// Maximum number of incorrect choices stored with a question
    pub const MAX_DISTRACTOR_COUNT: usize = super::round::MAX_CHOICE_COUNT - 1;
}

/// Quiz session constants
pub mod quiz {
    /// Minimum number of rounds in one quiz
    pub const MIN_ROUNDS: usize = 1;
    /// Maximum number of rounds in one quiz
    pub const MAX_ROUNDS: usize = 20;
    /// Maximum number of seconds any configured delay may span
    pub const MAX_DELAY_SECONDS: u64 = 3600;
}

/// Leaderboard display constants
pub mod leaderboard {
    /// Number of entries shown by the `top` command
    pub const DISPLAY_LIMIT: usize = 10;
}

/// Chat command constants
pub mod bot {
    /// Maximum number of command prefixes the bot listens for
    pub const MAX_PREFIX_COUNT: usize = 8;
    /// Maximum length of a command prefix in characters
    pub const MAX_PREFIX_LENGTH: usize = 32;
}
