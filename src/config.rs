//! Operator-tunable bot settings
//!
//! [`Options`] is read from a JSON file and validated before the bot uses it.
//! Every field has a default, so a file only needs the settings it changes.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
    constants::{
        bot::{MAX_PREFIX_COUNT, MAX_PREFIX_LENGTH},
        quiz::{MAX_DELAY_SECONDS, MAX_ROUNDS, MIN_ROUNDS},
    },
    question::Filters,
    scoreboard::PointPolicy,
};

type ValidationResult = garde::Result;

/// Validates that a delay does not exceed the configurable maximum
fn validate_delay(val: &Duration, _ctx: &()) -> ValidationResult {
    if val.as_secs() <= MAX_DELAY_SECONDS {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "outside of bounds [0,{MAX_DELAY_SECONDS}]"
        )))
    }
}

fn validate_time_limit(val: &Option<Duration>, ctx: &()) -> ValidationResult {
    match val {
        Some(limit) if limit.is_zero() => Err(garde::Error::new("time limit must be positive")),
        Some(limit) => validate_delay(limit, ctx),
        None => Ok(()),
    }
}

/// Errors raised while loading [`Options`]
#[derive(Error, Debug)]
pub enum Error {
    /// The settings file could not be read
    #[error("failed to read settings from {}: {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },
    /// The settings file is not valid JSON for [`Options`]
    #[error("failed to parse settings from {}: {source}", path.display())]
    Parse {
        /// File being parsed
        path: PathBuf,
        /// Underlying parse failure
        source: serde_json::Error,
    },
    /// A setting is out of range
    #[error("invalid settings: {0}")]
    Invalid(garde::Report),
}

/// Settings for quizzes run by [`crate::bot::TriviaBot`]
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Options {
    /// Points for the 1st, 2nd and 3rd correct answer of a round
    #[garde(dive)]
    pub points: PointPolicy,
    /// Rounds per quiz
    #[garde(range(min = MIN_ROUNDS, max = MAX_ROUNDS))]
    pub rounds: usize,
    /// Which questions quizzes draw from
    #[garde(dive)]
    pub filters: Filters,
    /// Pause between announcing a quiz and its first round
    #[garde(custom(validate_delay))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub intro_delay: Duration,
    /// Pause between one round closing and the next opening
    #[garde(custom(validate_delay))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub round_gap: Duration,
    /// How long a round stays open without reaching capacity
    ///
    /// `None` keeps rounds open until enough participants answer correctly.
    #[garde(custom(validate_time_limit))]
    #[serde_as(as = "Option<serde_with::DurationSeconds<u64>>")]
    pub answer_time_limit: Option<Duration>,
    /// Minimum time since the last completed round before a new quiz
    #[garde(custom(validate_delay))]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub cooldown: Duration,
    /// Words that address the bot in public chat
    #[garde(
        length(min = 1, max = MAX_PREFIX_COUNT),
        inner(length(chars, min = 1, max = MAX_PREFIX_LENGTH))
    )]
    pub prefixes: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            points: PointPolicy::default(),
            rounds: 3,
            filters: Filters::default(),
            intro_delay: Duration::from_secs(10),
            round_gap: Duration::from_secs(25),
            answer_time_limit: None,
            cooldown: Duration::from_secs(5 * 60),
            prefixes: vec!["trivia".to_string(), "!trivia".to_string()],
        }
    }
}

impl Options {
    /// Reads and validates settings from a JSON file
    ///
    /// # Errors
    ///
    /// * `Error::Io` - the file cannot be read
    /// * `Error::Parse` - the file is not a JSON settings object
    /// * `Error::Invalid` - a setting is out of range
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        let options: Self = serde_json::from_str(&contents).map_err(|source| Error::Parse {
            path: path.to_owned(),
            source,
        })?;
        options.validate().map_err(Error::Invalid)?;

        info!(
            path = %path.display(),
            rounds = options.rounds,
            cooldown = options.cooldown.as_secs(),
            "loaded settings"
        );
        Ok(options)
    }

    /// The prefix `text` starts with, if it addresses the bot
    ///
    /// A prefix only counts as a whole word, so `triviabot` does not match
    /// `trivia`.
    pub fn strip_prefix<'a>(&self, text: &'a str) -> Option<&'a str> {
        let text = text.trim_start();
        self.prefixes.iter().find_map(|prefix| {
            let rest = text.strip_prefix(prefix.as_str())?;
            (rest.is_empty() || rest.starts_with(char::is_whitespace)).then(|| rest.trim())
        })
    }
}
