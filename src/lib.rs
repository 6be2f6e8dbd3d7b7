//! # Trivia Quiz Library
//!
//! This library provides the round engine for a chat trivia quiz. It handles
//! answer collection and ranking for single rounds, multi-round quiz
//! sessions with a shared scoreboard, a durable cross-session leaderboard,
//! and a chat driver that turns commands and private answers into engine
//! calls.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::doc_markdown)]
use derive_where::derive_where;
use itertools::Itertools;
use serde::Serialize;
use thiserror::Error;

pub mod bot;
pub mod config;
pub mod constants;
pub mod leaderboard;
pub mod participant;
pub mod question;
pub mod quiz;
pub mod round;
pub mod scoreboard;
pub mod session;

/// Errors surfaced by the trivia engine and its driver
#[derive(Error, Debug)]
pub enum Error {
    /// A quiz operation was refused
    #[error(transparent)]
    Quiz(#[from] quiz::Error),
    /// Questions could not be loaded or drawn
    #[error(transparent)]
    Question(#[from] question::Error),
    /// The leaderboard could not be read or written
    #[error(transparent)]
    Persistence(#[from] leaderboard::Error),
    /// Settings could not be loaded
    #[error(transparent)]
    Config(#[from] config::Error),
    /// The chat transport failed to deliver a message
    #[error("chat transport failed: {0}")]
    Transport(String),
    /// A background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A list cut to a display limit that remembers how long it was
///
/// Used for leaderboard views that list the top few entries while still
/// reporting how many identities are ranked in total.
#[derive(Debug, Clone, Serialize)]
#[derive_where(Default)]
pub struct TruncatedVec<T> {
    exact_count: usize,
    items: Vec<T>,
}

impl<T> TruncatedVec<T> {
    /// Keeps the first `limit` items of `list`
    ///
    /// `exact_count` is the length of the full list, which may exceed
    /// `limit`.
    pub fn new<I: Iterator<Item = T>>(list: I, limit: usize, exact_count: usize) -> Self {
        let items = list.take(limit).collect_vec();
        Self { exact_count, items }
    }

    /// Length of the full list
    pub fn exact_count(&self) -> usize {
        self.exact_count
    }

    /// The kept items
    pub fn items(&self) -> &[T] {
        &self.items
    }
}
