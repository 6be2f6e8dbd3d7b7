//! Participant identities and recorded answers
//!
//! A participant is whoever the chat transport says sent a message. The
//! engine never authenticates identities; it only keys answers by them.

use std::{borrow::Borrow, fmt::Display};

use serde::{Deserialize, Serialize};
use web_time::SystemTime;

/// Transport-provided identity of a chat user
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::From,
    derive_more::AsRef,
)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity from anything string-like
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One identity's answer to one round
///
/// Participants are created by [`crate::round::Round::submit_answer`] and
/// never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    identity: Identity,
    choice: usize,
    submitted_at: SystemTime,
    correct: bool,
}

impl Participant {
    pub(crate) fn new(
        identity: Identity,
        choice: usize,
        submitted_at: SystemTime,
        correct: bool,
    ) -> Self {
        Self {
            identity,
            choice,
            submitted_at,
            correct,
        }
    }

    /// The identity that submitted this answer
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Zero-based index of the chosen answer, in the round's shuffled order
    pub fn choice(&self) -> usize {
        self.choice
    }

    /// Timestamp supplied by the transport for this answer
    pub fn submitted_at(&self) -> SystemTime {
        self.submitted_at
    }

    /// Whether the chosen answer was the correct one
    pub fn is_correct(&self) -> bool {
        self.correct
    }
}
