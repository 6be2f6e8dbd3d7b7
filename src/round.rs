//! Single question round and its answer-acceptance state machine
//!
//! A round is opened with a question and a fixed, shuffled list of choices.
//! Answers are accepted once per identity until the round closes, either
//! because [`CAPACITY`] participants answered correctly or because someone
//! called [`Round::close`]. Closing runs the registered completion exactly
//! once and then raises the signal that [`Round::closed`] waits on.

use std::{
    collections::{HashMap, hash_map::Entry},
    fmt::Debug,
};

use itertools::Itertools;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};
use web_time::SystemTime;

use crate::{
    constants::round::CAPACITY,
    participant::{Identity, Participant},
    question::{Difficulty, RoundSpec},
};

/// Callback run when a round closes
///
/// Receives the correct answer's text and the correct participants ordered
/// by submission time.
pub type Completion = Box<dyn FnOnce(&str, &[Participant]) + Send>;

/// Lifecycle of a round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    /// Accepting answers
    #[default]
    Open,
    /// No longer accepting answers; terminal
    Closed,
}

/// Mutable part of a round, guarded by one lock
#[derive(Default)]
struct Answers {
    state: RoundState,
    participants: HashMap<Identity, Participant>,
    /// Correct participants ordered by submission time, ties in arrival order
    ranked: Vec<Participant>,
    completion: Option<Completion>,
}

/// One question's lifecycle
pub struct Round {
    ordinal: usize,
    question: String,
    category: String,
    difficulty: Option<Difficulty>,
    correct_answer: String,
    choices: Vec<String>,
    correct_index: usize,
    is_final: bool,

    answers: Mutex<Answers>,
    closed: watch::Sender<bool>,
}

impl Debug for Round {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Round")
            .field("ordinal", &self.ordinal)
            .field("question", &self.question)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Round {
    /// Opens a round with choices shuffled by the thread-local generator
    ///
    /// # Arguments
    ///
    /// * `spec` - question, answer and choices
    /// * `ordinal` - 1-based position of the round in its quiz
    /// * `is_final` - whether no round follows this one
    pub fn open(spec: RoundSpec, ordinal: usize, is_final: bool) -> Self {
        Self::open_with_rng(spec, ordinal, is_final, &mut fastrand::Rng::new())
    }

    /// Opens a round, shuffling choices with the given generator
    ///
    /// Duplicate choices are dropped and the correct answer is added if the
    /// spec's choices do not contain it. The order produced here is the one
    /// every participant sees for the life of the round.
    pub fn open_with_rng(
        spec: RoundSpec,
        ordinal: usize,
        is_final: bool,
        rng: &mut fastrand::Rng,
    ) -> Self {
        let RoundSpec {
            question,
            correct_answer,
            choices,
            category,
            difficulty,
        } = spec;

        let mut choices = choices
            .into_iter()
            .chain(std::iter::once(correct_answer.clone()))
            .unique()
            .collect_vec();
        rng.shuffle(&mut choices);

        let correct_index = choices
            .iter()
            .position(|choice| *choice == correct_answer)
            .unwrap_or_default();

        Self {
            ordinal,
            question,
            category,
            difficulty,
            correct_answer,
            choices,
            correct_index,
            is_final,
            answers: Mutex::new(Answers::default()),
            closed: watch::Sender::new(false),
        }
    }

    /// Registers the callback run when the round closes
    ///
    /// Replaces any earlier registration. If the round has already closed the
    /// callback runs immediately with the recorded results.
    pub fn on_complete(&self, completion: impl FnOnce(&str, &[Participant]) + Send + 'static) {
        let mut answers = self.answers.lock();
        match answers.state {
            RoundState::Open => {
                answers.completion = Some(Box::new(completion));
            }
            RoundState::Closed => {
                let ranked = answers.ranked.clone();
                drop(answers);
                completion(&self.correct_answer, &ranked);
            }
        }
    }

    /// Records an answer from `identity`
    ///
    /// Returns `false` without touching any state if the identity already
    /// answered or the round is closed. An index outside the choices is
    /// recorded as an incorrect answer. When this answer brings the number of
    /// correct participants to [`CAPACITY`], the round closes and the
    /// completion runs on the calling thread before this returns.
    pub fn submit_answer(&self, identity: Identity, choice: usize, submitted_at: SystemTime) -> bool {
        let finished = {
            let mut guard = self.answers.lock();
            let answers = &mut *guard;

            if answers.state == RoundState::Closed {
                debug!(round = self.ordinal, %identity, "answer after close rejected");
                return false;
            }

            let Entry::Vacant(entry) = answers.participants.entry(identity) else {
                debug!(round = self.ordinal, "duplicate answer rejected");
                return false;
            };

            let correct = choice == self.correct_index;
            let participant = Participant::new(entry.key().clone(), choice, submitted_at, correct);
            debug!(
                round = self.ordinal,
                identity = %participant.identity(),
                choice,
                correct,
                "answer recorded"
            );

            if correct {
                let position = answers
                    .ranked
                    .partition_point(|p| p.submitted_at() <= submitted_at);
                answers.ranked.insert(position, participant.clone());
            }
            entry.insert(participant);

            (answers.ranked.len() >= CAPACITY).then(|| Self::finish(answers))
        };

        if let Some((completion, ranked)) = finished {
            self.complete(completion, &ranked);
        }

        true
    }

    /// Closes the round if it is still open
    ///
    /// Runs the completion with whatever correct answers were recorded, which
    /// may be none. Calling this on a closed round does nothing.
    pub fn close(&self) {
        let finished = {
            let mut answers = self.answers.lock();
            (answers.state == RoundState::Open).then(|| Self::finish(&mut answers))
        };

        if let Some((completion, ranked)) = finished {
            self.complete(completion, &ranked);
        }
    }

    /// Marks the round closed and takes what the completion needs
    ///
    /// Must be called with the lock held and the round open.
    fn finish(answers: &mut Answers) -> (Option<Completion>, Vec<Participant>) {
        answers.state = RoundState::Closed;
        (answers.completion.take(), answers.ranked.clone())
    }

    /// Runs the completion outside the lock, then raises the closed signal
    fn complete(&self, completion: Option<Completion>, ranked: &[Participant]) {
        info!(
            round = self.ordinal,
            correct = ranked.len(),
            answered = self.participant_count(),
            "round closed"
        );

        if let Some(completion) = completion {
            completion(&self.correct_answer, ranked);
        }

        self.closed.send_replace(true);
    }

    /// Waits until the round has closed and its completion has run
    ///
    /// Returns immediately for a round that is already closed.
    pub async fn closed(&self) {
        let mut receiver = self.closed.subscribe();
        // The sender lives as long as `self`, so waiting cannot fail.
        let _ = receiver.wait_for(|closed| *closed).await;
    }

    /// Current lifecycle state
    pub fn state(&self) -> RoundState {
        self.answers.lock().state
    }

    /// Whether the round still accepts answers
    pub fn is_open(&self) -> bool {
        self.state() == RoundState::Open
    }

    /// The answer recorded for `identity`, if any
    pub fn participant(&self, identity: &str) -> Option<Participant> {
        self.answers.lock().participants.get(identity).cloned()
    }

    /// Number of identities that have answered
    pub fn participant_count(&self) -> usize {
        self.answers.lock().participants.len()
    }

    /// Correct participants so far, ordered by submission time
    pub fn correct(&self) -> Vec<Participant> {
        self.answers.lock().ranked.clone()
    }

    /// 1-based position of this round in its quiz
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Whether this is the last round of its quiz
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// The question text
    pub fn question(&self) -> &str {
        &self.question
    }

    /// Category label
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Difficulty rating, if known
    pub fn difficulty(&self) -> Option<Difficulty> {
        self.difficulty
    }

    /// Choices in the order shown to participants
    pub fn choices(&self) -> &[String] {
        &self.choices
    }

    /// The correct answer's text
    pub fn correct_answer(&self) -> &str {
        &self.correct_answer
    }

    /// Index of the correct answer within [`Round::choices`]
    pub fn correct_index(&self) -> usize {
        self.correct_index
    }
}
