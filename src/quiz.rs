//! Quiz sessions: a fixed sequence of rounds sharing one scoreboard
//!
//! A [`Quiz`] owns its rounds and hands them out one at a time through
//! [`Quiz::start_round`]. When a round closes, the quiz awards points to its
//! ranked correct participants, folds them into the session scoreboard and
//! only then calls the handler supplied by the driver.

use std::{
    fmt::Display,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use itertools::Itertools;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;
use web_time::SystemTime;

use crate::{
    participant::{Identity, Participant},
    question::{self, RoundSpec},
    round::Round,
    scoreboard::{PointPolicy, Scoreboard},
};

/// Unique identifier of a quiz session, used to correlate log events
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuizId(Uuid);

impl QuizId {
    /// Creates a new random quiz ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QuizId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for QuizId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Errors raised while driving a quiz
#[derive(Error, Serialize, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A round is open; it must close before the next one starts
    #[error("a quiz is already in progress")]
    AlreadyInProgress,
    /// Every round of the quiz has already been started
    #[error("every round of this quiz has been played")]
    SessionFinished,
    /// An answer did not name one of the round's choices
    #[error("{given:?} is not a number between 1 and {count}")]
    InvalidAnswerIndex {
        /// What the participant sent
        given: String,
        /// How many choices the round offers
        count: usize,
    },
}

/// Session state shared with the completion closures of started rounds
#[derive(Debug, Default)]
struct Session {
    in_progress: AtomicBool,
    scoreboard: Mutex<Scoreboard>,
    last_completed_at: Mutex<Option<SystemTime>>,
}

/// One quiz session
///
/// Rounds are built up front and played in order. At most one round is open
/// at a time; `in_progress` is true exactly while it is.
#[derive(Debug)]
pub struct Quiz {
    id: QuizId,
    rounds: Vec<Arc<Round>>,
    /// Index of the most recently started round
    cursor: Mutex<Option<usize>>,
    policy: PointPolicy,
    started_at: SystemTime,
    session: Arc<Session>,
}

impl Quiz {
    /// Builds a quiz from round specs, played in the given order
    ///
    /// # Errors
    ///
    /// Returns `question::Error::NoQuestionsAvailable` if `specs` is empty.
    pub fn new(specs: Vec<RoundSpec>, policy: PointPolicy) -> Result<Self, question::Error> {
        if specs.is_empty() {
            return Err(question::Error::NoQuestionsAvailable);
        }

        let count = specs.len();
        let rounds = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Arc::new(Round::open(spec, index + 1, index + 1 == count)))
            .collect_vec();

        let quiz = Self {
            id: QuizId::new(),
            rounds,
            cursor: Mutex::new(None),
            policy,
            started_at: SystemTime::now(),
            session: Arc::default(),
        };
        info!(quiz = %quiz.id, rounds = count, "quiz created");

        Ok(quiz)
    }

    /// Starts the next round
    ///
    /// `on_complete` runs once when the round closes, after the round's
    /// points have been added to the scoreboard and `in_progress` has been
    /// cleared. It receives the correct answer and the correct participants
    /// ordered by submission time. An error it returns is logged.
    ///
    /// # Errors
    ///
    /// * `Error::AlreadyInProgress` - the current round is still open
    /// * `Error::SessionFinished` - there is no round left to start
    pub fn start_round<F>(&self, on_complete: F) -> Result<Arc<Round>, Error>
    where
        F: FnOnce(&str, &[Participant]) -> Result<(), crate::Error> + Send + 'static,
    {
        let mut cursor = self.cursor.lock();

        if self.session.in_progress.load(Ordering::SeqCst) {
            return Err(Error::AlreadyInProgress);
        }

        let next = cursor.map_or(0, |current| current + 1);
        let round = self.rounds.get(next).cloned().ok_or(Error::SessionFinished)?;

        *cursor = Some(next);
        self.session.in_progress.store(true, Ordering::SeqCst);

        let session = Arc::clone(&self.session);
        let policy = self.policy.clone();
        let quiz = self.id;
        let ordinal = round.ordinal();
        round.on_complete(move |answer, ranked| {
            let awards = policy.award(ranked);
            session.scoreboard.lock().add_scores(&awards);
            *session.last_completed_at.lock() = Some(SystemTime::now());
            session.in_progress.store(false, Ordering::SeqCst);

            info!(
                %quiz,
                round = ordinal,
                awarded = awards.iter().map(|(_, points)| points).sum::<u64>(),
                "round scored"
            );

            if let Err(e) = on_complete(answer, ranked) {
                error!(%quiz, round = ordinal, error = %e, "round completion handler failed");
            }
        });

        info!(%quiz, round = ordinal, is_final = round.is_final(), "round started");
        Ok(round)
    }

    /// Standings so far, highest points first
    ///
    /// Ties are ordered by identity, descending. Identities without points
    /// are not listed.
    pub fn sorted_score(&self) -> Vec<(Identity, u64)> {
        self.session.scoreboard.lock().sorted()
    }

    /// A copy of the session scoreboard
    pub fn scoreboard(&self) -> Scoreboard {
        self.session.scoreboard.lock().clone()
    }

    /// Whether a round is currently open
    pub fn in_progress(&self) -> bool {
        self.session.in_progress.load(Ordering::SeqCst)
    }

    /// The most recently started round, if any
    pub fn current_round(&self) -> Option<Arc<Round>> {
        self.cursor
            .lock()
            .and_then(|index| self.rounds.get(index).cloned())
    }

    /// Whether another round can still be started after the current one
    pub fn has_next_round(&self) -> bool {
        self.cursor
            .lock()
            .map_or(!self.rounds.is_empty(), |index| index + 1 < self.rounds.len())
    }

    /// Whether every round has been played to completion
    pub fn is_finished(&self) -> bool {
        !self.has_next_round() && !self.in_progress()
    }

    /// Number of rounds in the quiz
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// This session's identifier
    pub fn id(&self) -> QuizId {
        self.id
    }

    /// When the quiz was created
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    /// When the most recent round closed, if any has
    pub fn last_completed_at(&self) -> Option<SystemTime> {
        *self.session.last_completed_at.lock()
    }
}
