//! The TrueSkill rating algorithm, a Bayesian skill rating system based on a factor graph.
//!
//! Every player is described by a Gaussian belief: a rating (mu) and an uncertainty (sigma).
//! A match is modelled as a graph of factors linking each player's skill to their performance,
//! the performances of a team to a team performance, and adjacent teams in the finishing order
//! to a truncated performance difference. Messages are passed along the graph until the
//! differences settle, and the marginals of the skill variables are the new ratings.
//!
//! Draws are disabled by default (`draw_probability` of `0.0`). Teams sharing a rank are still
//! accepted and are rated as an exact tie between their performances.
//!
//! # Quickstart
//!
//! ```rust
//! use ratings::{
//!     Outcomes,
//!     trueskill::{TrueSkillConfig, TrueSkillRating, trueskill},
//! };
//!
//! // Initialise a new player rating with a rating of 25, and an uncertainty of 25/3 ≈ 8.33.
//! let player_one = TrueSkillRating::new();
//!
//! // Or you can initialise it with your own values of course.
//! // Imagine these numbers being pulled from a database.
//! let player_two = TrueSkillRating {
//!     rating: 30.2,
//!     uncertainty: 1.2,
//! };
//!
//! // The outcome of the match is from the perspective of player one.
//! let outcome = Outcomes::WIN;
//!
//! // The config allows you to specify certain values in the TrueSkill calculation.
//! // Here we enable draws with a 10% chance.
//! let config = TrueSkillConfig {
//!     draw_probability: 0.1,
//!     ..Default::default()
//! };
//!
//! let (new_one, new_two) = trueskill(&player_one, &player_two, &outcome, &config).unwrap();
//!
//! assert!(new_one.rating > player_one.rating);
//! assert!(new_two.rating < player_two.rating);
//! ```
//!
//! # More Information
//! - [Wikipedia Article](https://en.wikipedia.org/wiki/TrueSkill)
//! - [TrueSkill Ranking System](https://www.microsoft.com/en-us/research/project/trueskill-ranking-system/)
//! - [Original Paper (PDF)](https://proceedings.neurips.cc/paper/2006/file/f44ee263952e65b3610b8ba51229d1f9-Paper.pdf)
//! - [The math behind TrueSkill (PDF)](http://www.moserware.com/assets/computing-your-skill/The%20Math%20Behind%20TrueSkill.pdf)

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    Error, MultiTeamOutcome, MultiTeamRatingSystem, Outcomes, Rating,
    gaussian::{Gaussian, cdf, pdf, ppf},
};

/// Message passing stops once no truncation factor moves more than this.
const MIN_DELTA: f64 = 0.000_1;
/// Upper bound of message passing sweeps over the team difference layer.
const MAX_ITERATIONS: usize = 10;
/// `w` is kept strictly below 1 so the truncated variance never reaches zero.
const MAX_VARIANCE_REDUCTION: f64 = 1.0 - 1e-9;
/// Below this `cdf` value the win correction uses its asymptote.
const CDF_UNDERFLOW: f64 = 2.222_758_749e-162;

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
/// The TrueSkill rating of a player.
///
/// The default rating is 25.0.
/// The default uncertainty is 25/3 ≈ 8.33.
///
/// Serialized as `{"mu": .., "sigma": ..}`.
pub struct TrueSkillRating {
    /// The rating value (mu) of the TrueSkilLRating, by default 25.0.
    #[cfg_attr(feature = "serde", serde(rename = "mu"))]
    pub rating: f64,
    /// The uncertainty value (sigma) of the TrueSkillRating, by default 25/3 ≈ 8.33.
    #[cfg_attr(feature = "serde", serde(rename = "sigma"))]
    pub uncertainty: f64,
}

impl TrueSkillRating {
    #[must_use]
    /// Initialise a new TrueSkillRating with a rating of 25.0, and an uncertainty of 25/3 ≈ 8.33.
    pub const fn new() -> Self {
        Self {
            rating: 25.0,
            uncertainty: 25.0 / 3.0,
        }
    }

    #[must_use]
    /// The conservative skill estimate `rating - 3 * uncertainty`.
    ///
    /// Roughly a 99% lower bound of the player's skill. Used to order leaderboards,
    /// never to rate matches.
    pub fn conservative(&self) -> f64 {
        3.0f64.mul_add(-self.uncertainty, self.rating)
    }
}

impl Default for TrueSkillRating {
    fn default() -> Self {
        Self::new()
    }
}

impl Rating for TrueSkillRating {
    fn rating(&self) -> f64 {
        self.rating
    }
    fn uncertainty(&self) -> Option<f64> {
        Some(self.uncertainty)
    }
    fn new(rating: Option<f64>, uncertainty: Option<f64>) -> Self {
        Self {
            rating: rating.unwrap_or(25.0),
            uncertainty: uncertainty.unwrap_or(25.0 / 3.0),
        }
    }
}

impl From<(f64, f64)> for TrueSkillRating {
    fn from((r, u): (f64, f64)) -> Self {
        Self {
            rating: r,
            uncertainty: u,
        }
    }
}

impl From<TrueSkillRating> for (f64, f64) {
    fn from(r: TrueSkillRating) -> Self {
        (r.rating, r.uncertainty)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
/// Constants used in the TrueSkill calculations.
pub struct TrueSkillConfig {
    /// The probability of draws occurring in match.
    /// The higher the probability, the bigger the updates to the ratings in a non-drawn outcome.
    /// By default set to `0.0`, matches are never expected to end in a draw.
    /// Teams sharing a rank are then rated as an exact tie.
    pub draw_probability: f64,
    /// The skill-class width, aka the number of difference in rating points
    /// needed to have an 80% win probability against another player.
    /// By default set to 25 / 6 ≈ `4.167`.
    /// If your game is more reliant on pure skill, decrease this value,
    /// if there are more random factors, increase it.
    pub beta: f64,
    /// The additive dynamics factor.
    /// It determines how easy it will be for a player to move up and down a leaderboard.
    /// A larger value will tend to cause more volatility of player positions.
    /// By default set to 25 / 300 ≈ `0.0833`.
    pub default_dynamics: f64,
    /// Keeps the new uncertainty of a player at or below their old uncertainty.
    ///
    /// The dynamics factor is added before every match, so a player with a very small
    /// uncertainty could otherwise come out of a match less certain than they went in.
    /// By default set to `true`.
    pub limit_uncertainty: bool,
}

impl TrueSkillConfig {
    #[must_use]
    /// Initialise a new `TrueSkillConfig` with a draw probability of `0.0`,
    /// a beta value of 25 / 6 ≈ `4.167`, a default dynamics value of 25 / 300 ≈ `0.0833`
    /// and uncertainty limiting enabled.
    pub const fn new() -> Self {
        Self {
            draw_probability: 0.0,
            beta: 25.0 / 6.0,
            default_dynamics: 25.0 / 300.0,
            limit_uncertainty: true,
        }
    }
}

impl Default for TrueSkillConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Struct to calculate ratings and match quality for [`TrueSkillRating`]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrueSkill {
    config: TrueSkillConfig,
}

impl TrueSkill {
    #[must_use]
    /// The configuration every update of this engine uses.
    pub const fn config(&self) -> &TrueSkillConfig {
        &self.config
    }

    /// Rates one match given as parallel lists of participant groups and finishing ranks.
    ///
    /// `groups[i]` finished with rank `ranks[i]`; rank 0 is the winner and equal ranks tie.
    /// The new ratings come back in the same group and member order.
    ///
    /// # Errors
    /// [`Error::RankCountMismatch`] when `ranks` and `groups` differ in length,
    /// plus everything [`trueskill_multi_team`] rejects.
    ///
    /// # Examples
    /// ```rust
    /// use ratings::{MultiTeamRatingSystem, trueskill::{TrueSkill, TrueSkillConfig, TrueSkillRating}};
    ///
    /// let engine = TrueSkill::new(TrueSkillConfig::new());
    /// let groups = vec![vec![TrueSkillRating::new()], vec![TrueSkillRating::new()]];
    ///
    /// let rated = engine.update(&groups, &[1, 0]).unwrap();
    ///
    /// assert!(rated[0][0].rating < 25.0);
    /// assert!(rated[1][0].rating > 25.0);
    /// ```
    pub fn update<G>(&self, groups: &[G], ranks: &[usize]) -> Result<Vec<Vec<TrueSkillRating>>, Error>
    where
        G: AsRef<[TrueSkillRating]>,
    {
        if groups.len() != ranks.len() {
            return Err(Error::RankCountMismatch {
                groups: groups.len(),
                ranks: ranks.len(),
            });
        }

        let teams_and_ranks: Vec<(&[TrueSkillRating], MultiTeamOutcome)> = groups
            .iter()
            .zip(ranks)
            .map(|(group, rank)| (group.as_ref(), MultiTeamOutcome::new(*rank)))
            .collect();

        trueskill_multi_team(&teams_and_ranks, &self.config)
    }
}

impl MultiTeamRatingSystem for TrueSkill {
    type RATING = TrueSkillRating;
    type CONFIG = TrueSkillConfig;

    fn new(config: Self::CONFIG) -> Self {
        Self { config }
    }

    fn rate(
        &self,
        teams_and_ranks: &[(&[TrueSkillRating], MultiTeamOutcome)],
    ) -> Result<Vec<Vec<TrueSkillRating>>, Error> {
        trueskill_multi_team(teams_and_ranks, &self.config)
    }

    fn match_quality(&self, team_one: &[TrueSkillRating], team_two: &[TrueSkillRating]) -> f64 {
        match_quality_two_teams(team_one, team_two, &self.config)
    }
}

/// Calculates the [`TrueSkillRating`]s of two players based on their old ratings, uncertainties, and the outcome of the game.
///
/// Takes in two players as [`TrueSkillRating`]s, an [`Outcome`](Outcomes), and a [`TrueSkillConfig`].
///
/// The outcome of the match is in the perspective of `player_one`.
/// This means [`Outcomes::WIN`] is a win for `player_one` and [`Outcomes::LOSS`] is a win for `player_two`.
///
/// # Errors
/// Fails when a rating is not finite or an uncertainty is not positive.
///
/// # Examples
/// ```rust
/// # use assert_eq_float::assert_eq_float;
/// use ratings::{
///     Outcomes,
///     trueskill::{TrueSkillConfig, TrueSkillRating, trueskill},
/// };
///
/// let player_one = TrueSkillRating::new();
/// let player_two = TrueSkillRating::new();
///
/// let (new_one, new_two) = trueskill(
///     &player_one,
///     &player_two,
///     &Outcomes::WIN,
///     &TrueSkillConfig::new(),
/// )
/// .unwrap();
///
/// assert_eq_float!((new_one.rating * 100.0).round(), 2921.0);
/// assert_eq_float!((new_one.uncertainty * 100.0).round(), 719.0);
/// assert_eq_float!((new_two.rating * 100.0).round(), 2079.0);
/// assert_eq_float!((new_two.uncertainty * 100.0).round(), 719.0);
/// ```
pub fn trueskill(
    player_one: &TrueSkillRating,
    player_two: &TrueSkillRating,
    outcome: &Outcomes,
    config: &TrueSkillConfig,
) -> Result<(TrueSkillRating, TrueSkillRating), Error> {
    let (rank_one, rank_two) = outcome.to_ranks();
    let rated = trueskill_multi_team(
        &[
            (std::slice::from_ref(player_one), rank_one),
            (std::slice::from_ref(player_two), rank_two),
        ],
        config,
    )?;

    Ok((rated[0][0], rated[1][0]))
}

/// Calculates the [`TrueSkillRating`] of several teams based on their ratings, uncertainties, and ranks of the teams.
///
/// Takes in a slice, which contains tuples of teams, which are just slices of [`TrueSkillRating`]s,
/// as well the rank of the team as an [`MultiTeamOutcome`] and a [`TrueSkillConfig`].
///
/// Ties are represented by several teams having the same rank.
/// A single player is a team of one, so a free-for-all is a list of singleton teams.
///
/// Returns new ratings and uncertainties of players in the teams in the same order.
///
/// # Errors
/// - [`Error::NotEnoughGroups`] with fewer than two teams.
/// - [`Error::EmptyGroup`] when a team has no members.
/// - [`Error::NonFiniteRating`] and [`Error::NonPositiveDeviation`] for malformed ratings.
///
/// # Examples
/// ```rust
/// # use assert_eq_float::assert_eq_float;
/// use ratings::{
///     MultiTeamOutcome,
///     trueskill::{TrueSkillConfig, TrueSkillRating, trueskill_multi_team},
/// };
///
/// let first = vec![TrueSkillRating::new()];
/// let second = vec![TrueSkillRating::new()];
/// let third = vec![TrueSkillRating::new()];
///
/// let teams_and_ranks = vec![
///     (&third[..], MultiTeamOutcome::new(2)),
///     (&first[..], MultiTeamOutcome::new(0)),
///     (&second[..], MultiTeamOutcome::new(1)),
/// ];
///
/// let new_teams = trueskill_multi_team(&teams_and_ranks, &TrueSkillConfig::new()).unwrap();
///
/// assert_eq!(new_teams.len(), 3);
///
/// assert_eq_float!((new_teams[0][0].rating * 100.0).round(), 1869.0);
/// assert_eq_float!((new_teams[1][0].rating * 100.0).round(), 3131.0);
/// assert_eq_float!((new_teams[2][0].rating * 100.0).round(), 2500.0);
/// ```
pub fn trueskill_multi_team(
    teams_and_ranks: &[(&[TrueSkillRating], MultiTeamOutcome)],
    config: &TrueSkillConfig,
) -> Result<Vec<Vec<TrueSkillRating>>, Error> {
    validate(teams_and_ranks)?;

    // Stable, so tied teams keep their input order.
    let mut order: Vec<usize> = (0..teams_and_ranks.len()).collect();
    order.sort_by_key(|&i| teams_and_ranks[i].1);

    let sorted: Vec<(&[TrueSkillRating], MultiTeamOutcome)> =
        order.iter().map(|&i| teams_and_ranks[i]).collect();

    let mut graph = FactorGraph::build(&sorted, config);
    graph.run_schedule();
    let posteriors = graph.skills();

    let mut new_teams = vec![Vec::new(); teams_and_ranks.len()];
    for ((team, _), (original, posterior)) in sorted
        .iter()
        .zip(order.iter().zip(posteriors))
    {
        new_teams[*original] = team
            .iter()
            .zip(posterior)
            .map(|(prior, new)| TrueSkillRating {
                rating: new.mu(),
                uncertainty: if config.limit_uncertainty {
                    new.sigma().min(prior.uncertainty)
                } else {
                    new.sigma()
                },
            })
            .collect();
    }

    Ok(new_teams)
}

#[must_use]
/// Gets the quality of the match, which is equal to the probability that the match will end in a draw.
/// The higher the Value, the better the quality of the match.
///
/// Takes in two teams as slices of [`TrueSkillRating`]s and returns the probability of a draw occurring as an [`f64`] between 1.0 and 0.0.
///
/// # Examples
/// ```rust
/// use ratings::trueskill::{TrueSkillConfig, TrueSkillRating, match_quality_two_teams};
///
/// let even = match_quality_two_teams(
///     &[TrueSkillRating::new(), TrueSkillRating::new()],
///     &[TrueSkillRating::new(), TrueSkillRating::new()],
///     &TrueSkillConfig::new(),
/// );
/// let lopsided = match_quality_two_teams(
///     &[TrueSkillRating::from((40.0, 2.0)), TrueSkillRating::from((38.0, 2.0))],
///     &[TrueSkillRating::from((12.0, 2.0)), TrueSkillRating::from((15.0, 2.0))],
///     &TrueSkillConfig::new(),
/// );
///
/// assert!(even > lopsided);
/// assert!(even <= 1.0 && lopsided >= 0.0);
/// ```
pub fn match_quality_two_teams(
    team_one: &[TrueSkillRating],
    team_two: &[TrueSkillRating],
    config: &TrueSkillConfig,
) -> f64 {
    let total_players = (team_one.len() + team_two.len()) as f64;

    let rating_difference = team_rating(team_one) - team_rating(team_two);
    let variance = total_players.mul_add(
        config.beta.powi(2),
        team_variance(team_one) + team_variance(team_two),
    );

    let a = (total_players * config.beta.powi(2) / variance).sqrt();
    let b = (-rating_difference.powi(2) / (2.0 * variance)).exp();

    a * b
}

#[must_use]
/// Calculates the expected outcome of two teams based on TrueSkill.
///
/// Takes in two teams as a Slice of [`TrueSkillRating`]s and a [`TrueSkillConfig`],
/// and returns the probability of victory for each team as an [`f64`] between 1.0 and 0.0.
///
/// 1.0 means a certain victory for the team, 0.0 means certain loss.
/// Values near 0.5 mean a draw is likely to occur.
///
/// # Examples
/// ```rust
/// # use assert_eq_float::assert_eq_float;
/// use ratings::trueskill::{TrueSkillConfig, TrueSkillRating, expected_score_two_teams};
///
/// let (exp1, exp2) = expected_score_two_teams(
///     &[TrueSkillRating::from((30.0, 2.0))],
///     &[TrueSkillRating::new()],
///     &TrueSkillConfig::new(),
/// );
///
/// assert_eq_float!(((exp1 + exp2) * 100.0).round(), 100.0);
/// assert!(exp1 > exp2);
/// ```
pub fn expected_score_two_teams(
    team_one: &[TrueSkillRating],
    team_two: &[TrueSkillRating],
    config: &TrueSkillConfig,
) -> (f64, f64) {
    let total_players = (team_one.len() + team_two.len()) as f64;

    let rating_difference = team_rating(team_one) - team_rating(team_two);
    let deviation = total_players
        .mul_add(
            config.beta.powi(2),
            team_variance(team_one) + team_variance(team_two),
        )
        .sqrt();

    let exp_one = cdf(rating_difference / deviation);
    let exp_two = 1.0 - exp_one;

    (exp_one, exp_two)
}

fn team_rating(team: &[TrueSkillRating]) -> f64 {
    team.iter().map(|p| p.rating).sum()
}

fn team_variance(team: &[TrueSkillRating]) -> f64 {
    team.iter().map(|p| p.uncertainty.powi(2)).sum()
}

fn validate(teams_and_ranks: &[(&[TrueSkillRating], MultiTeamOutcome)]) -> Result<(), Error> {
    if teams_and_ranks.len() < 2 {
        return Err(Error::NotEnoughGroups(teams_and_ranks.len()));
    }

    for (group, (team, _)) in teams_and_ranks.iter().enumerate() {
        if team.is_empty() {
            return Err(Error::EmptyGroup { group });
        }
        for (member, player) in team.iter().enumerate() {
            if !player.rating.is_finite() {
                return Err(Error::NonFiniteRating {
                    group,
                    member,
                    rating: player.rating,
                });
            }
            if !(player.uncertainty > 0.0 && player.uncertainty.is_finite()) {
                return Err(Error::NonPositiveDeviation {
                    group,
                    member,
                    uncertainty: player.uncertainty,
                });
            }
        }
    }

    Ok(())
}

/// Draw margin between two adjacent teams with `players` members in total.
fn draw_margin(draw_probability: f64, players: usize, beta: f64) -> f64 {
    if draw_probability <= 0.0 {
        return 0.0;
    }
    ppf((draw_probability + 1.0) / 2.0) * (players as f64).sqrt() * beta
}

// Additive correction of the truncated mean for a win by `difference` with the given margin.
fn v_non_draw(difference: f64, draw_margin: f64) -> f64 {
    let x = difference - draw_margin;
    let norm = cdf(x);

    if norm < CDF_UNDERFLOW {
        -x
    } else {
        pdf(x) / norm
    }
}

// Multiplicative correction of the truncated variance for a win.
fn w_non_draw(difference: f64, draw_margin: f64) -> f64 {
    let x = difference - draw_margin;
    let v = v_non_draw(difference, draw_margin);

    (v * (v + x)).clamp(0.0, MAX_VARIANCE_REDUCTION)
}

fn v_draw(difference: f64, draw_margin: f64) -> f64 {
    let abs_diff = difference.abs();
    let a = draw_margin - abs_diff;
    let b = -draw_margin - abs_diff;

    let norm = cdf(a) - cdf(b);
    // A zero margin leaves an exact tie: the difference collapses onto 0.
    let v = if norm > 0.0 { (pdf(b) - pdf(a)) / norm } else { a };

    if difference < 0.0 { -v } else { v }
}

fn w_draw(difference: f64, draw_margin: f64) -> f64 {
    let abs_diff = difference.abs();
    let a = draw_margin - abs_diff;
    let b = -draw_margin - abs_diff;

    let norm = cdf(a) - cdf(b);
    if norm <= 0.0 {
        return MAX_VARIANCE_REDUCTION;
    }

    let v = v_draw(abs_diff, draw_margin);
    let w = v.mul_add(v, a.mul_add(pdf(a), -b * pdf(b)) / norm);

    w.clamp(0.0, MAX_VARIANCE_REDUCTION)
}

/// A node of the factor graph: the current marginal plus the last message from every attached factor.
#[derive(Debug, Default)]
struct Variable {
    value: Gaussian,
    messages: Vec<(usize, Gaussian)>,
}

impl Variable {
    fn attach(&mut self, factor: usize) {
        self.messages.push((factor, Gaussian::default()));
    }

    fn message(&self, factor: usize) -> Gaussian {
        self.messages
            .iter()
            .find(|(id, _)| *id == factor)
            .map_or_else(Gaussian::default, |(_, message)| *message)
    }

    fn set_message(&mut self, factor: usize, message: Gaussian) {
        if let Some(slot) = self.messages.iter_mut().find(|(id, _)| *id == factor) {
            slot.1 = message;
        }
    }

    fn set(&mut self, value: Gaussian) -> f64 {
        let pi_delta = (self.value.pi - value.pi).abs();
        let delta = if pi_delta.is_infinite() {
            0.0
        } else {
            (self.value.tau - value.tau).abs().max(pi_delta.sqrt())
        };
        self.value = value;
        delta
    }

    fn update_message(&mut self, factor: usize, message: Gaussian) -> f64 {
        let old_message = self.message(factor);
        self.set_message(factor, message);
        self.set(self.value / old_message * message)
    }

    fn update_value(&mut self, factor: usize, value: Gaussian) -> f64 {
        let old_message = self.message(factor);
        self.set_message(factor, value * old_message / self.value);
        self.set(value)
    }
}

#[derive(Debug)]
struct PriorFactor {
    id: usize,
    variable: usize,
    value: Gaussian,
}

#[derive(Debug)]
struct LikelihoodFactor {
    id: usize,
    mean: usize,
    value: usize,
    variance: f64,
}

#[derive(Debug)]
struct SumFactor {
    id: usize,
    sum: usize,
    terms: Vec<usize>,
    coefficients: Vec<f64>,
}

#[derive(Debug)]
struct TruncateFactor {
    id: usize,
    variable: usize,
    draw_margin: f64,
    tie: bool,
}

/// The factor graph of one match, with teams already sorted by rank.
#[derive(Debug)]
struct FactorGraph {
    variables: Vec<Variable>,
    skills: Vec<Vec<usize>>,
    priors: Vec<PriorFactor>,
    likelihoods: Vec<LikelihoodFactor>,
    team_performances: Vec<SumFactor>,
    team_differences: Vec<SumFactor>,
    truncations: Vec<TruncateFactor>,
    next_factor: usize,
}

impl FactorGraph {
    fn build(sorted: &[(&[TrueSkillRating], MultiTeamOutcome)], config: &TrueSkillConfig) -> Self {
        let mut graph = Self {
            variables: Vec::new(),
            skills: Vec::with_capacity(sorted.len()),
            priors: Vec::new(),
            likelihoods: Vec::new(),
            team_performances: Vec::with_capacity(sorted.len()),
            team_differences: Vec::with_capacity(sorted.len() - 1),
            truncations: Vec::with_capacity(sorted.len() - 1),
            next_factor: 0,
        };

        let mut team_performance_vars = Vec::with_capacity(sorted.len());
        for (team, _) in sorted {
            let mut skill_vars = Vec::with_capacity(team.len());
            let mut performance_vars = Vec::with_capacity(team.len());

            for player in *team {
                let skill = graph.variable();
                let performance = graph.variable();

                let id = graph.factor(&[skill]);
                graph.priors.push(PriorFactor {
                    id,
                    variable: skill,
                    value: Gaussian::with_mu_sigma(
                        player.rating,
                        player.uncertainty.hypot(config.default_dynamics),
                    ),
                });

                let id = graph.factor(&[skill, performance]);
                graph.likelihoods.push(LikelihoodFactor {
                    id,
                    mean: skill,
                    value: performance,
                    variance: config.beta.powi(2),
                });

                skill_vars.push(skill);
                performance_vars.push(performance);
            }

            let team_performance = graph.variable();
            graph.push_sum(
                Layer::TeamPerformance,
                team_performance,
                performance_vars,
                vec![1.0; team.len()],
            );

            graph.skills.push(skill_vars);
            team_performance_vars.push(team_performance);
        }

        for (i, pair) in sorted.windows(2).enumerate() {
            let difference = graph.variable();
            graph.push_sum(
                Layer::TeamDifference,
                difference,
                vec![team_performance_vars[i], team_performance_vars[i + 1]],
                vec![1.0, -1.0],
            );

            let id = graph.factor(&[difference]);
            graph.truncations.push(TruncateFactor {
                id,
                variable: difference,
                draw_margin: draw_margin(
                    config.draw_probability,
                    pair[0].0.len() + pair[1].0.len(),
                    config.beta,
                ),
                tie: pair[0].1 == pair[1].1,
            });
        }

        graph
    }

    fn variable(&mut self) -> usize {
        self.variables.push(Variable::default());
        self.variables.len() - 1
    }

    fn factor(&mut self, variables: &[usize]) -> usize {
        let id = self.next_factor;
        self.next_factor += 1;
        for &variable in variables {
            self.variables[variable].attach(id);
        }
        id
    }

    fn push_sum(&mut self, layer: Layer, sum: usize, terms: Vec<usize>, coefficients: Vec<f64>) {
        let mut attached = Vec::with_capacity(terms.len() + 1);
        attached.push(sum);
        attached.extend(&terms);
        let id = self.factor(&attached);

        let factor = SumFactor {
            id,
            sum,
            terms,
            coefficients,
        };
        match layer {
            Layer::TeamPerformance => self.team_performances.push(factor),
            Layer::TeamDifference => self.team_differences.push(factor),
        }
    }

    fn run_schedule(&mut self) {
        let Self {
            variables,
            priors,
            likelihoods,
            team_performances,
            team_differences,
            truncations,
            ..
        } = self;

        for prior in priors.iter() {
            prior.down(variables);
        }
        for likelihood in likelihoods.iter() {
            likelihood.down(variables);
        }
        for team in team_performances.iter() {
            team.down(variables);
        }

        let last = team_differences.len() - 1;
        for _ in 0..MAX_ITERATIONS {
            let delta = if last == 0 {
                team_differences[0].down(variables);
                truncations[0].up(variables)
            } else {
                let mut delta: f64 = 0.0;
                for x in 0..last {
                    team_differences[x].down(variables);
                    delta = delta.max(truncations[x].up(variables));
                    team_differences[x].up(variables, 1);
                }
                for x in (1..=last).rev() {
                    team_differences[x].down(variables);
                    delta = delta.max(truncations[x].up(variables));
                    team_differences[x].up(variables, 0);
                }
                delta
            };

            if delta <= MIN_DELTA {
                break;
            }
        }

        team_differences[0].up(variables, 0);
        team_differences[last].up(variables, 1);
        for team in team_performances.iter() {
            for x in 0..team.terms.len() {
                team.up(variables, x);
            }
        }
        for likelihood in likelihoods.iter() {
            likelihood.up(variables);
        }
    }

    fn skills(&self) -> Vec<Vec<Gaussian>> {
        self.skills
            .iter()
            .map(|team| team.iter().map(|&v| self.variables[v].value).collect())
            .collect()
    }
}

#[derive(Clone, Copy, Debug)]
enum Layer {
    TeamPerformance,
    TeamDifference,
}

impl PriorFactor {
    fn down(&self, variables: &mut [Variable]) -> f64 {
        variables[self.variable].update_value(self.id, self.value)
    }
}

impl LikelihoodFactor {
    fn down(&self, variables: &mut [Variable]) -> f64 {
        let message = Self::scaled(
            variables[self.mean].value / variables[self.mean].message(self.id),
            self.variance,
        );
        variables[self.value].update_message(self.id, message)
    }

    fn up(&self, variables: &mut [Variable]) -> f64 {
        let message = Self::scaled(
            variables[self.value].value / variables[self.value].message(self.id),
            self.variance,
        );
        variables[self.mean].update_message(self.id, message)
    }

    fn scaled(message: Gaussian, variance: f64) -> Gaussian {
        let a = 1.0 / variance.mul_add(message.pi, 1.0);
        Gaussian::with_precision(a * message.pi, a * message.tau)
    }
}

impl SumFactor {
    fn down(&self, variables: &mut [Variable]) -> f64 {
        self.update(variables, self.sum, &self.terms, &self.coefficients)
    }

    fn up(&self, variables: &mut [Variable], index: usize) -> f64 {
        let coefficient = self.coefficients[index];
        let coefficients: Vec<f64> = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(x, c)| {
                if coefficient == 0.0 {
                    0.0
                } else if x == index {
                    1.0 / coefficient
                } else {
                    -c / coefficient
                }
            })
            .collect();

        let mut values = self.terms.clone();
        values[index] = self.sum;

        self.update(variables, self.terms[index], &values, &coefficients)
    }

    fn update(
        &self,
        variables: &mut [Variable],
        target: usize,
        values: &[usize],
        coefficients: &[f64],
    ) -> f64 {
        let mut pi_inv: f64 = 0.0;
        let mut mu = 0.0;

        for (&value, coefficient) in values.iter().zip(coefficients) {
            let div = variables[value].value / variables[value].message(self.id);
            mu += coefficient * div.mu();
            if pi_inv.is_infinite() {
                continue;
            }
            if div.pi == 0.0 {
                pi_inv = f64::INFINITY;
            } else {
                pi_inv += coefficient.powi(2) / div.pi;
            }
        }

        let pi = 1.0 / pi_inv;
        variables[target].update_message(self.id, Gaussian::with_precision(pi, pi * mu))
    }
}

impl TruncateFactor {
    fn up(&self, variables: &mut [Variable]) -> f64 {
        let variable = &variables[self.variable];
        let div = variable.value / variable.message(self.id);
        let sqrt_pi = div.pi.sqrt();

        let difference = div.tau / sqrt_pi;
        let margin = self.draw_margin * sqrt_pi;
        let (v, w) = if self.tie {
            (v_draw(difference, margin), w_draw(difference, margin))
        } else {
            (v_non_draw(difference, margin), w_non_draw(difference, margin))
        };

        let denominator = 1.0 - w;
        let value = Gaussian::with_precision(
            div.pi / denominator,
            sqrt_pi.mul_add(v, div.tau) / denominator,
        );
        variables[self.variable].update_value(self.id, value)
    }
}
