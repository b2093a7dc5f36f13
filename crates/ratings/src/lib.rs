#![deny(
    missing_docs,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    // This is turned off because of the rating values in the structs
    clippy::module_name_repetitions,
    // "TrueSkill" shows up as a false positive otherwise
    clippy::doc_markdown,
    // Need to cast usizes to f64s where precision is not that important, also there seems to be no good alternative.
    clippy::cast_precision_loss,
)]
#![doc = include_str!("../README.md")]

#[cfg(feature = "serde")]
use serde::de::DeserializeOwned;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod gaussian;
pub mod trueskill;

/// The possible outcomes for a 1v1 match: WIN, LOSS, DRAW.
///
/// Note that this is always from the perspective of player one.
/// That means a win is a win for player one and a loss is a win for player two.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Outcomes {
    /// A win, from player_one's perspective.
    WIN,
    /// A loss, from player_one's perspective.
    LOSS,
    /// A draw.
    DRAW,
}

impl Outcomes {
    #[must_use]
    /// Converts the outcome into finishing ranks for `(player_one, player_two)`.
    ///
    /// Rank 0 is the winner. A draw gives both players the same rank.
    pub const fn to_ranks(self) -> (MultiTeamOutcome, MultiTeamOutcome) {
        match self {
            Self::WIN => (MultiTeamOutcome(0), MultiTeamOutcome(1)),
            Self::LOSS => (MultiTeamOutcome(1), MultiTeamOutcome(0)),
            Self::DRAW => (MultiTeamOutcome(0), MultiTeamOutcome(0)),
        }
    }
}

/// Outcome for a free-for-all match or a match that involves more than two teams.
///
/// Every team is assigned a rank, depending on their placement. The lower the rank, the better.
/// If two or more teams tie with each other, assign them the same rank.
///
/// For example: Team A takes 1st place, Team C takes 2nd place, Team B takes 3rd place,
/// and Teams D and E tie with each other and both take the 4th place.
/// In that case you would assign Team A = 0, Team B = 2, Team C = 1, Team D = 3, and Team E = 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MultiTeamOutcome(usize);

impl MultiTeamOutcome {
    #[must_use]
    #[inline]
    /// Makes a new `MultiTeamOutcome` from a given rank.
    pub const fn new(rank: usize) -> Self {
        Self(rank)
    }

    #[must_use]
    #[inline]
    /// Returns the rank that corresponds to this `MultiTeamOutcome`.
    pub const fn rank(self) -> usize {
        self.0
    }
}

impl From<usize> for MultiTeamOutcome {
    #[inline]
    fn from(v: usize) -> Self {
        Self(v)
    }
}

impl From<MultiTeamOutcome> for usize {
    #[inline]
    fn from(v: MultiTeamOutcome) -> Self {
        v.0
    }
}

/// Measure of player's skill.
///
/// A rating is a Gaussian belief: a single value for the skill and an uncertainty around it.
pub trait Rating {
    /// A single value for player's skill
    fn rating(&self) -> f64;
    /// A value for the uncertainty of a players rating.
    /// If the algorithm does not include an uncertainty value, this will return `None`.
    fn uncertainty(&self) -> Option<f64>;
    /// Initialise a `Rating` with provided score and uncertainty, if `None` use default.
    /// If the algorithm does not include an uncertainty value it will get dismissed.
    fn new(rating: Option<f64>, uncertainty: Option<f64>) -> Self;
}

/// Rating system for two or more teams, with ties.
///
/// 📌 _**Important note:**_ The MultiTeamRatingSystem Trait only implements the `rate` and `match_quality` functions.
/// Some rating systems might also implement additional functions which you can only access by using those directly.
pub trait MultiTeamRatingSystem {
    #[cfg(feature = "serde")]
    /// Rating type rating system
    type RATING: Rating + Copy + std::fmt::Debug + DeserializeOwned + Serialize;
    #[cfg(not(feature = "serde"))]
    /// Rating type rating system
    type RATING: Rating + Copy + std::fmt::Debug;
    /// Config type for rating system.
    type CONFIG;
    /// Initialise rating system with provided config. If the rating system does not require a config, leave empty brackets.
    fn new(config: Self::CONFIG) -> Self;
    /// Calculate ratings for multiple teams based on provided ratings and outcome.
    ///
    /// # Errors
    /// Fails when fewer than two teams are given, a team is empty or a rating is malformed.
    fn rate(
        &self,
        teams_and_ranks: &[(&[Self::RATING], MultiTeamOutcome)],
    ) -> Result<Vec<Vec<Self::RATING>>, Error>;
    /// Calculate how balanced a match between two teams is, from 0.0 (one-sided) to 1.0 (even).
    fn match_quality(&self, team_one: &[Self::RATING], team_two: &[Self::RATING]) -> f64;
}

/// Invalid input handed to a rating system.
///
/// These are caller mistakes; retrying the same call fails the same way.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A match needs at least two participant groups.
    #[error("at least two participant groups required, got {0}")]
    NotEnoughGroups(usize),
    /// Every participant group needs exactly one rank.
    #[error("`ranks` has {ranks} entries but there are {groups} participant groups")]
    RankCountMismatch {
        /// Number of participant groups.
        groups: usize,
        /// Number of ranks.
        ranks: usize,
    },
    /// A participant group without members.
    #[error("participant group {group} is empty")]
    EmptyGroup {
        /// Index of the group, in input order.
        group: usize,
    },
    /// A rating whose uncertainty is zero, negative or NaN.
    #[error("uncertainty must be positive, got {uncertainty} (group {group}, member {member})")]
    NonPositiveDeviation {
        /// Index of the group, in input order.
        group: usize,
        /// Index of the member inside its group.
        member: usize,
        /// The offending value.
        uncertainty: f64,
    },
    /// A rating whose value is infinite or NaN.
    #[error("rating must be finite, got {rating} (group {group}, member {member})")]
    NonFiniteRating {
        /// Index of the group, in input order.
        group: usize,
        /// Index of the member inside its group.
        member: usize,
        /// The offending value.
        rating: f64,
    },
}
