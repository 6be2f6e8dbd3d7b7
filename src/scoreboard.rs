//! In-session scoring
//!
//! [`PointPolicy`] decides how many points each place in a round earns and
//! [`Scoreboard`] accumulates those awards across the rounds of one quiz.

use std::collections::HashMap;

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    constants::round::CAPACITY,
    participant::{Identity, Participant},
};

/// Points awarded to the 1st, 2nd, ... correct participant of a round
///
/// Only the first `CAPACITY` places can score, since a round closes once
/// that many participants answered correctly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(transparent)]
pub struct PointPolicy(#[garde(length(min = 1, max = CAPACITY), inner(range(min = 1)))] Vec<u64>);

impl Default for PointPolicy {
    fn default() -> Self {
        Self(vec![3, 2, 1])
    }
}

impl PointPolicy {
    /// Creates a policy from per-place point values
    pub fn new(points: Vec<u64>) -> Self {
        Self(points)
    }

    /// Point values by place, first place first
    pub fn places(&self) -> &[u64] {
        &self.0
    }

    /// Pairs each ranked participant with the points their place earns
    ///
    /// Participants beyond the configured places receive nothing and are
    /// left out.
    pub fn award(&self, ranked: &[Participant]) -> Vec<(Identity, u64)> {
        ranked
            .iter()
            .zip(&self.0)
            .map(|(participant, points)| (participant.identity().clone(), *points))
            .collect_vec()
    }
}

/// Points per identity for the current quiz
///
/// Identities only appear once they have scored, and points never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scoreboard {
    points: HashMap<Identity, u64>,
}

impl Scoreboard {
    /// Adds one round's awards, saturating at `u64::MAX`
    pub fn add_scores(&mut self, scores: &[(Identity, u64)]) {
        for (identity, points) in scores.iter().filter(|(_, points)| *points > 0) {
            let total = self.points.entry(identity.clone()).or_default();
            *total = total.saturating_add(*points);
        }
    }

    /// Points held by `identity`, zero if it has not scored
    pub fn points(&self, identity: &str) -> u64 {
        self.points.get(identity).copied().unwrap_or_default()
    }

    /// Sum of all points awarded so far, saturating at `u64::MAX`
    pub fn total(&self) -> u64 {
        self.points.values().fold(0, |sum, points| sum.saturating_add(*points))
    }

    /// Number of identities that have scored
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nobody has scored yet
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Standings, highest points first
    ///
    /// Equal points are ordered by identity, descending, so the whole
    /// ordering is by `(points, identity)` from high to low.
    pub fn sorted(&self) -> Vec<(Identity, u64)> {
        descending(&self.points)
    }

    /// Points as a plain mapping, for merging into the leaderboard
    pub fn as_map(&self) -> &HashMap<Identity, u64> {
        &self.points
    }
}

/// Orders points from high to low, ties by identity from high to low
pub(crate) fn descending<'a>(
    points: impl IntoIterator<Item = (&'a Identity, &'a u64)>,
) -> Vec<(Identity, u64)> {
    points
        .into_iter()
        .map(|(identity, points)| (identity.clone(), *points))
        .sorted_by(|(a_id, a_points), (b_id, b_points)| (b_points, b_id).cmp(&(a_points, a_id)))
        .collect_vec()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use web_time::SystemTime;

    fn ranked(names: &[&str]) -> Vec<Participant> {
        names
            .iter()
            .map(|name| Participant::new((*name).into(), 0, SystemTime::now(), true))
            .collect()
    }

    #[test]
    fn test_default_policy_is_three_two_one() {
        let policy = PointPolicy::default();
        assert_eq!(policy.places(), &[3, 2, 1]);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        assert!(PointPolicy::new(vec![]).validate().is_err());
        assert!(PointPolicy::new(vec![5, 4, 3, 2]).validate().is_err());
        assert!(PointPolicy::new(vec![5, 0]).validate().is_err());
        assert!(PointPolicy::new(vec![1]).validate().is_ok());
    }

    #[test]
    fn test_award_follows_rank() {
        let awards = PointPolicy::default().award(&ranked(&["a", "b"]));
        assert_eq!(awards, vec![(Identity::new("a"), 3), (Identity::new("b"), 2)]);

        let awards = PointPolicy::new(vec![10]).award(&ranked(&["a", "b", "c"]));
        assert_eq!(awards, vec![(Identity::new("a"), 10)]);
    }

    #[test]
    fn test_scoreboard_accumulates() {
        let mut scoreboard = Scoreboard::default();
        scoreboard.add_scores(&[("a".into(), 3), ("b".into(), 2)]);
        scoreboard.add_scores(&[("b".into(), 3), ("c".into(), 0)]);

        assert_eq!(scoreboard.points("a"), 3);
        assert_eq!(scoreboard.points("b"), 5);
        assert_eq!(scoreboard.points("c"), 0);
        assert_eq!(scoreboard.len(), 2);
        assert_eq!(scoreboard.total(), 8);
    }

    #[test]
    fn test_scoreboard_saturates_instead_of_overflowing() {
        let mut scoreboard = Scoreboard::default();
        scoreboard.add_scores(&[("a".into(), u64::MAX), ("b".into(), 1)]);
        scoreboard.add_scores(&[("a".into(), 3)]);

        assert_eq!(scoreboard.points("a"), u64::MAX);
        assert_eq!(scoreboard.total(), u64::MAX);
    }

    #[test]
    fn test_sorted_breaks_ties_by_identity() {
        let mut scoreboard = Scoreboard::default();
        scoreboard.add_scores(&[("A".into(), 3), ("B".into(), 2), ("C".into(), 1)]);
        scoreboard.add_scores(&[("B".into(), 3), ("A".into(), 2)]);

        assert_eq!(
            scoreboard.sorted(),
            vec![
                (Identity::new("B"), 5),
                (Identity::new("A"), 5),
                (Identity::new("C"), 1)
            ]
        );
    }

    #[test]
    fn test_sorted_total_matches_awards() {
        let policy = PointPolicy::default();
        let mut scoreboard = Scoreboard::default();
        let mut awarded = 0;
        let rounds: [&[&str]; 4] = [&["x", "y", "z"], &["z"], &[], &["y", "x"]];
        for round in rounds {
            let awards = policy.award(&ranked(round));
            awarded += awards.iter().map(|(_, p)| p).sum::<u64>();
            scoreboard.add_scores(&awards);
        }

        let sorted_total: u64 = scoreboard.sorted().iter().map(|(_, p)| p).sum();
        assert_eq!(sorted_total, awarded);
        assert_eq!(scoreboard.total(), awarded);
    }
}
