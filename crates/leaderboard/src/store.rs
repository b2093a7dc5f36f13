use std::{cmp::Ordering, collections::BTreeMap};

use ratings::{
    MultiTeamRatingSystem,
    trueskill::{TrueSkill, TrueSkillConfig, TrueSkillRating},
};
use serde::{Deserialize, Serialize};

use crate::{history::MatchHistory, outcome::MatchOutcome};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("invalid match outcome: {0}")]
    Outcome(#[from] crate::outcome::Error),
    #[error("rating update rejected: {0}")]
    Rating(#[from] ratings::Error),
    #[error("stored rating for `{player}` is invalid (mu {mu}, sigma {sigma})")]
    InvalidStoredRating { player: String, mu: f64, sigma: f64 },
    #[error("replaying match {index} failed: {source}")]
    Replay {
        index: usize,
        #[source]
        source: Box<Error>,
    },
}

/// A player's current rating plus derived counters.
///
/// Only `rating` is authoritative. `wins` counts matches finished in first place
/// (shared first place and every member of a winning team included), `played` every match.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Standing {
    pub rating: TrueSkillRating,
    pub wins: u32,
    pub played: u32,
}

/// How one match moved a player.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingChange {
    pub player: String,
    pub before: TrueSkillRating,
    pub after: TrueSkillRating,
}

/// A row of the ranking view.
#[derive(Debug, Clone, PartialEq)]
pub struct Ranked {
    pub position: usize,
    pub player: String,
    pub standing: Standing,
    pub conservative: f64,
}

/// The rating table of one game.
///
/// Always reconstructible from the game's [`MatchHistory`]: if the two disagree,
/// [`rebuild_from_history`](Self::rebuild_from_history) is the remedy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Leaderboard {
    players: BTreeMap<String, Standing>,
    engine: TrueSkill,
}

impl Leaderboard {
    pub fn new(config: TrueSkillConfig) -> Self {
        Self {
            players: BTreeMap::new(),
            engine: TrueSkill::new(config),
        }
    }

    /// Replays `history` into a fresh leaderboard.
    pub fn replay(config: TrueSkillConfig, history: &MatchHistory) -> Result<Self, Error> {
        let mut leaderboard = Self::new(config);
        for (index, outcome) in history.into_iter().enumerate() {
            leaderboard
                .apply_outcome(outcome)
                .map_err(|source| Error::Replay {
                    index,
                    source: Box::new(source),
                })?;
        }
        Ok(leaderboard)
    }

    pub const fn config(&self) -> &TrueSkillConfig {
        self.engine.config()
    }

    /// The stored rating, or the default rating for a player without matches.
    pub fn get(&self, player: &str) -> TrueSkillRating {
        self.players
            .get(player)
            .map(|standing| standing.rating)
            .unwrap_or_default()
    }

    pub fn standing(&self, player: &str) -> Option<&Standing> {
        self.players.get(player)
    }

    /// Rates `outcome` and stores every participant's new rating.
    ///
    /// Either every participant is updated or, on error, nothing is.
    pub fn apply_outcome(&mut self, outcome: &MatchOutcome) -> Result<Vec<RatingChange>, Error> {
        outcome.validate()?;

        let (names, ranks) = outcome.groups();
        let priors: Vec<Vec<TrueSkillRating>> = names
            .iter()
            .map(|group| group.iter().map(|player| self.get(player)).collect())
            .collect();

        let posteriors = self.engine.update(&priors, &ranks)?;

        let mut changes = Vec::with_capacity(outcome.players().len());
        for (((group, before), after), rank) in names.iter().zip(&priors).zip(posteriors).zip(&ranks) {
            for ((player, before), after) in group.iter().zip(before).zip(after) {
                let standing = self.players.entry((*player).to_string()).or_default();
                standing.rating = after;
                standing.played += 1;
                if *rank == 0 {
                    standing.wins += 1;
                }

                changes.push(RatingChange {
                    player: (*player).to_string(),
                    before: *before,
                    after,
                });
            }
        }

        Ok(changes)
    }

    /// Resets to empty and replays `history`, oldest first.
    ///
    /// Deterministic: the same history always yields bit-identical ratings.
    /// On error the leaderboard keeps its previous state.
    pub fn rebuild_from_history(&mut self, history: &MatchHistory) -> Result<(), Error> {
        *self = Self::replay(*self.config(), history)?;
        Ok(())
    }

    /// Ranking view: conservative score descending, ties by name.
    pub fn standings(&self) -> Vec<Ranked> {
        let mut rows: Vec<(&String, &Standing, f64)> = self
            .players
            .iter()
            .map(|(player, standing)| (player, standing, standing.rating.conservative()))
            .collect();

        rows.sort_by(|a, b| match b.2.total_cmp(&a.2) {
            Ordering::Equal => a.0.cmp(b.0),
            ordering => ordering,
        });

        rows.into_iter()
            .enumerate()
            .map(|(i, (player, standing, conservative))| Ranked {
                position: i + 1,
                player: player.clone(),
                standing: *standing,
                conservative,
            })
            .collect()
    }

    /// Plain `player -> rating` snapshot.
    pub fn ratings(&self) -> BTreeMap<String, TrueSkillRating> {
        self.players
            .iter()
            .map(|(player, standing)| (player.clone(), standing.rating))
            .collect()
    }

    pub fn players(&self) -> impl Iterator<Item = (&str, &Standing)> {
        self.players.iter().map(|(player, standing)| (player.as_str(), standing))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    /// Loads a persisted table. Ratings with a non-positive or non-finite sigma are rejected.
    pub fn from_document(config: TrueSkillConfig, document: LeaderboardDocument) -> Result<Self, Error> {
        let mut leaderboard = Self::new(config);
        for (player, stored) in document.0 {
            if !(stored.sigma > 0.0 && stored.sigma.is_finite() && stored.mu.is_finite()) {
                return Err(Error::InvalidStoredRating {
                    player,
                    mu: stored.mu,
                    sigma: stored.sigma,
                });
            }
            leaderboard.players.insert(
                player,
                Standing {
                    rating: TrueSkillRating::from((stored.mu, stored.sigma)),
                    wins: stored.wins,
                    played: stored.played,
                },
            );
        }
        Ok(leaderboard)
    }

    pub fn to_document(&self) -> LeaderboardDocument {
        LeaderboardDocument(
            self.players
                .iter()
                .map(|(player, standing)| {
                    (
                        player.clone(),
                        StoredRating {
                            mu: standing.rating.rating,
                            sigma: standing.rating.uncertainty,
                            wins: standing.wins,
                            played: standing.played,
                        },
                    )
                })
                .collect(),
        )
    }
}

/// Persisted leaderboard: `{"<player>": {"mu": .., "sigma": .., "wins": ..}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaderboardDocument(pub BTreeMap<String, StoredRating>);

/// One persisted rating. Reads `{"mu", "sigma", ...}` objects and legacy `[mu, sigma]` pairs,
/// always writes objects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredShape")]
pub struct StoredRating {
    pub mu: f64,
    pub sigma: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub wins: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub played: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(count: &u32) -> bool {
    *count == 0
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredShape {
    Object {
        mu: f64,
        sigma: f64,
        #[serde(default)]
        wins: u32,
        #[serde(default)]
        played: u32,
    },
    Pair(f64, f64),
}

impl From<StoredShape> for StoredRating {
    fn from(shape: StoredShape) -> Self {
        match shape {
            StoredShape::Object {
                mu,
                sigma,
                wins,
                played,
            } => Self {
                mu,
                sigma,
                wins,
                played,
            },
            StoredShape::Pair(mu, sigma) => Self {
                mu,
                sigma,
                wins: 0,
                played: 0,
            },
        }
    }
}

/// Each player's mean after every match they played, oldest first.
pub fn progression(
    config: TrueSkillConfig,
    history: &MatchHistory,
) -> Result<BTreeMap<String, Vec<f64>>, Error> {
    let mut leaderboard = Leaderboard::new(config);
    let mut means: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for (index, outcome) in history.into_iter().enumerate() {
        let changes = leaderboard
            .apply_outcome(outcome)
            .map_err(|source| Error::Replay {
                index,
                source: Box::new(source),
            })?;
        for change in changes {
            means.entry(change.player).or_default().push(change.after.rating);
        }
    }

    Ok(means)
}

#[cfg(test)]
mod tests {
    use assert_eq_float::assert_eq_float;
    use serde_json::json;

    use super::*;
    use crate::outcome::Winner;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn sample_history() -> MatchHistory {
        MatchHistory::from(vec![
            MatchOutcome::individual(["Alice", "Bob", "Carol"]),
            MatchOutcome::team(["Alice", "Dan"], ["Bob", "Carol"], Winner::TeamB),
            MatchOutcome::free_for_all([("Carol", 0), ("Dan", 0), ("Alice", 2), ("Bob", 3)]),
            MatchOutcome::individual(["Bob", "Alice"]),
        ])
    }

    #[test]
    fn unknown_player_has_default_rating() {
        let leaderboard = Leaderboard::default();
        let rating = leaderboard.get("nobody");

        assert_eq_float!(rating.rating, 25.0);
        assert_eq_float!(rating.uncertainty, 25.0 / 3.0);
        assert!(leaderboard.standing("nobody").is_none());
    }

    #[test]
    fn two_recorded_matches() {
        let mut leaderboard = Leaderboard::default();

        leaderboard
            .apply_outcome(&MatchOutcome::individual(["Alice", "Bob"]))
            .unwrap();
        let alice = leaderboard.get("Alice");
        let bob = leaderboard.get("Bob");
        assert!(close(alice.rating, 29.205_473_176_557_78));
        assert!(close(bob.rating, 20.794_526_823_442_208));
        assert!(alice.uncertainty < 25.0 / 3.0 && bob.uncertainty < 25.0 / 3.0);

        let changes = leaderboard
            .apply_outcome(&MatchOutcome::individual(["Bob", "Alice"]))
            .unwrap();
        let alice_after = leaderboard.get("Alice");
        // One win and one loss leave Alice just below the default mean.
        assert!(close(alice_after.rating, 23.472_142_181_654_736));
        assert!(close(leaderboard.get("Bob").rating, 26.527_857_818_345_257));
        assert!(alice_after.rating < alice.rating);

        assert_eq!(changes[1].player, "Alice");
        assert_eq!(changes[1].before, alice);
        assert_eq!(leaderboard.standing("Alice").unwrap().wins, 1);
        assert_eq!(leaderboard.standing("Bob").unwrap().played, 2);
    }

    #[test]
    fn free_for_all_shared_first_place() {
        let mut leaderboard = Leaderboard::default();
        leaderboard
            .apply_outcome(&MatchOutcome::free_for_all([("Alice", 0), ("Bob", 0), ("Carol", 1)]))
            .unwrap();

        let alice = leaderboard.get("Alice").rating;
        let bob = leaderboard.get("Bob").rating;
        assert!(alice > 25.0);
        assert!(close(alice, bob));
        assert!(leaderboard.get("Carol").rating < 25.0);
        assert_eq!(leaderboard.standing("Alice").unwrap().wins, 1);
        assert_eq!(leaderboard.standing("Bob").unwrap().wins, 1);
        assert_eq!(leaderboard.standing("Carol").unwrap().wins, 0);
    }

    #[test]
    fn ranked_teams_rate_like_team_matches() {
        let mut teams = Leaderboard::default();
        teams
            .apply_outcome(&MatchOutcome::team(["Alice", "Bob"], ["Carol"], Winner::TeamB))
            .unwrap();
        let mut ranked = Leaderboard::default();
        ranked
            .apply_outcome(&MatchOutcome::ranked_teams([(vec!["Alice", "Bob"], 4), (vec!["Carol"], 1)]))
            .unwrap();
        assert_eq!(ranked.ratings(), teams.ratings());

        ranked
            .apply_outcome(&MatchOutcome::ranked_teams([
                (vec!["Alice"], 0),
                (vec!["Bob", "Dan"], 0),
                (vec!["Carol"], 1),
            ]))
            .unwrap();
        assert_eq!(ranked.standing("Dan").unwrap().wins, 1);
        assert_eq!(ranked.standing("Carol").unwrap().wins, 1);
        assert_eq!(ranked.standing("Carol").unwrap().played, 2);
    }

    #[test]
    fn uncertainty_never_grows() {
        let mut leaderboard = Leaderboard::default();
        for outcome in sample_history().all() {
            let changes = leaderboard.apply_outcome(outcome).unwrap();
            for change in changes {
                assert!(change.after.uncertainty <= change.before.uncertainty, "{change:?}");
            }
        }
    }

    #[test]
    fn invalid_outcome_leaves_leaderboard_unchanged() {
        let mut leaderboard = Leaderboard::default();
        leaderboard
            .apply_outcome(&MatchOutcome::individual(["Alice", "Bob"]))
            .unwrap();
        let before = leaderboard.clone();

        let err = leaderboard
            .apply_outcome(&MatchOutcome::team(["Alice"], Vec::<&str>::new(), Winner::TeamA))
            .unwrap_err();

        assert_eq!(
            err,
            Error::Outcome(crate::outcome::Error::EmptyTeam { field: "team_b" })
        );
        assert_eq!(leaderboard, before);
    }

    #[test]
    fn replay_is_deterministic() {
        let history = sample_history();
        let once = Leaderboard::replay(TrueSkillConfig::new(), &history).unwrap();
        let twice = Leaderboard::replay(TrueSkillConfig::new(), &history).unwrap();

        for ((name, a), (_, b)) in once.players().zip(twice.players()) {
            assert_eq!(a.rating.rating.to_bits(), b.rating.rating.to_bits(), "{name}");
            assert_eq!(a.rating.uncertainty.to_bits(), b.rating.uncertainty.to_bits(), "{name}");
        }
    }

    #[test]
    fn incremental_matches_rebuild() {
        let history = sample_history();
        let mut incremental = Leaderboard::default();
        for outcome in history.all() {
            incremental.apply_outcome(outcome).unwrap();
        }

        let mut rebuilt = Leaderboard::default();
        rebuilt
            .apply_outcome(&MatchOutcome::individual(["Zed", "Alice"]))
            .unwrap();
        rebuilt.rebuild_from_history(&history).unwrap();

        assert_eq!(rebuilt, incremental);
        assert!(rebuilt.standing("Zed").is_none());
    }

    #[test]
    fn undo_then_rebuild_forgets_last_match() {
        let mut history = sample_history();
        let mut expected = history.clone();
        expected.remove_last().unwrap();

        history.remove_last().unwrap();
        let mut leaderboard = Leaderboard::default();
        leaderboard.rebuild_from_history(&history).unwrap();

        assert_eq!(
            leaderboard,
            Leaderboard::replay(TrueSkillConfig::new(), &expected).unwrap()
        );
    }

    #[test]
    fn failed_rebuild_keeps_previous_state() {
        let mut leaderboard = Leaderboard::default();
        leaderboard
            .apply_outcome(&MatchOutcome::individual(["Alice", "Bob"]))
            .unwrap();
        let before = leaderboard.clone();

        let broken = MatchHistory::from(vec![
            MatchOutcome::individual(["Carol", "Dan"]),
            MatchOutcome::individual(["Carol"]),
        ]);
        let err = leaderboard.rebuild_from_history(&broken).unwrap_err();

        assert!(matches!(err, Error::Replay { index: 1, .. }), "{err}");
        assert_eq!(leaderboard, before);
    }

    #[test]
    fn standings_order_by_conservative_then_name() {
        let document: LeaderboardDocument = serde_json::from_value(json!({
            "Carol": {"mu": 40.0, "sigma": 8.0},
            "Bob": {"mu": 25.0, "sigma": 2.0},
            "Alice": {"mu": 25.0, "sigma": 2.0},
            "Dan": {"mu": 30.0, "sigma": 1.0}
        }))
        .unwrap();
        let leaderboard = Leaderboard::from_document(TrueSkillConfig::new(), document).unwrap();

        let standings = leaderboard.standings();
        let names: Vec<&str> = standings.iter().map(|row| row.player.as_str()).collect();

        assert_eq!(names, ["Dan", "Alice", "Bob", "Carol"]);
        assert_eq!(standings[0].position, 1);
        assert_eq!(standings[3].position, 4);
        assert_eq_float!(standings[0].conservative, 27.0);
        assert_eq_float!(standings[3].conservative, 16.0);
    }

    #[test]
    fn document_reads_objects_and_pairs() {
        let document: LeaderboardDocument = serde_json::from_value(json!({
            "Alice": {"mu": 30.0, "sigma": 5.0, "wins": 2},
            "Bob": [20.0, 6.0]
        }))
        .unwrap();
        let leaderboard = Leaderboard::from_document(TrueSkillConfig::new(), document).unwrap();

        assert_eq!(leaderboard.get("Bob"), TrueSkillRating::from((20.0, 6.0)));
        assert_eq!(leaderboard.standing("Alice").unwrap().wins, 2);
        assert_eq!(
            serde_json::to_value(leaderboard.to_document()).unwrap(),
            json!({
                "Alice": {"mu": 30.0, "sigma": 5.0, "wins": 2},
                "Bob": {"mu": 20.0, "sigma": 6.0}
            })
        );
    }

    #[test]
    fn document_rejects_non_positive_sigma() {
        let document: LeaderboardDocument =
            serde_json::from_value(json!({"Alice": {"mu": 30.0, "sigma": 0.0}})).unwrap();

        assert_eq!(
            Leaderboard::from_document(TrueSkillConfig::new(), document),
            Err(Error::InvalidStoredRating {
                player: "Alice".to_string(),
                mu: 30.0,
                sigma: 0.0
            })
        );
    }

    #[test]
    fn progression_tracks_means_per_match() {
        let history = sample_history();
        let means = progression(TrueSkillConfig::new(), &history).unwrap();
        let final_board = Leaderboard::replay(TrueSkillConfig::new(), &history).unwrap();

        assert_eq!(means["Alice"].len(), 4);
        assert_eq!(means["Dan"].len(), 2);
        assert!(close(*means["Alice"].last().unwrap(), final_board.get("Alice").rating));
        assert!(close(means["Alice"][0], 31.311_736_639_814_29));
    }
}
