use std::collections::HashSet;

use ratings::trueskill::{TrueSkillRating, expected_score_two_teams, match_quality_two_teams};

use crate::store::Leaderboard;

/// Largest group [`balance_teams`] splits; 20 players already means 184 756 candidate splits.
pub const MAX_PLAYERS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("balanced teams need an even number of at least two players, got {0}")]
    UnevenPlayers(usize),
    #[error("player `{0}` is listed more than once")]
    DuplicatePlayer(String),
    #[error("at most {MAX_PLAYERS} players can be balanced, got {0}")]
    TooManyPlayers(usize),
}

/// A suggested split of players into two teams of equal size.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSplit {
    pub team_a: Vec<String>,
    pub team_b: Vec<String>,
    /// Sum of the conservative scores of team A.
    pub score_a: f64,
    pub score_b: f64,
    /// TrueSkill match quality, 1.0 for a perfectly even match.
    pub quality: f64,
    /// Probability that team A wins.
    pub win_probability_a: f64,
}

/// Splits `players` into two equal halves whose summed conservative scores are closest.
///
/// Every half is tried in lexicographic order of the input positions, and the first
/// split with the smallest difference wins, so the result only depends on input order.
/// Players without a rating count with the default rating. Every split is enumerated,
/// so at most [`MAX_PLAYERS`] players are accepted.
pub fn balance_teams<S: AsRef<str>>(players: &[S], leaderboard: &Leaderboard) -> Result<TeamSplit, Error> {
    let count = players.len();
    if count < 2 || count % 2 != 0 {
        return Err(Error::UnevenPlayers(count));
    }
    if count > MAX_PLAYERS {
        return Err(Error::TooManyPlayers(count));
    }

    let mut seen = HashSet::new();
    for player in players {
        let name = player.as_ref();
        if !seen.insert(name) {
            return Err(Error::DuplicatePlayer(name.to_string()));
        }
    }

    let ratings: Vec<TrueSkillRating> = players.iter().map(|p| leaderboard.get(p.as_ref())).collect();
    let scores: Vec<f64> = ratings.iter().map(TrueSkillRating::conservative).collect();
    let total: f64 = scores.iter().sum();

    let mut best: Option<(f64, Vec<usize>)> = None;
    let mut half: Vec<usize> = (0..count / 2).collect();
    loop {
        let score_a: f64 = half.iter().map(|&i| scores[i]).sum();
        let difference = (2.0f64.mul_add(score_a, -total)).abs();
        if best.as_ref().is_none_or(|(smallest, _)| difference < *smallest) {
            best = Some((difference, half.clone()));
        }
        if !next_combination(&mut half, count) {
            break;
        }
    }

    let chosen = best.map(|(_, half)| half).unwrap_or_default();
    let in_a = |i: &usize| chosen.contains(i);

    let (a, b): (Vec<usize>, Vec<usize>) = (0..count).partition(in_a);
    let names = |side: &[usize]| -> Vec<String> { side.iter().map(|&i| players[i].as_ref().to_string()).collect() };
    let team_ratings = |side: &[usize]| -> Vec<TrueSkillRating> { side.iter().map(|&i| ratings[i]).collect() };
    let score = |side: &[usize]| -> f64 { side.iter().map(|&i| scores[i]).sum() };

    let (ratings_a, ratings_b) = (team_ratings(&a), team_ratings(&b));
    let (win_probability_a, _) = expected_score_two_teams(&ratings_a, &ratings_b, leaderboard.config());

    Ok(TeamSplit {
        team_a: names(&a),
        team_b: names(&b),
        score_a: score(&a),
        score_b: score(&b),
        quality: match_quality_two_teams(&ratings_a, &ratings_b, leaderboard.config()),
        win_probability_a,
    })
}

/// Advances `indices` to the next `k`-combination of `0..n` in lexicographic order.
fn next_combination(indices: &mut [usize], n: usize) -> bool {
    let k = indices.len();
    let Some(pivot) = (0..k).rev().find(|&i| indices[i] < n - k + i) else {
        return false;
    };
    indices[pivot] += 1;
    for i in pivot + 1..k {
        indices[i] = indices[i - 1] + 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use assert_eq_float::assert_eq_float;
    use ratings::trueskill::TrueSkillConfig;
    use serde_json::json;

    use super::*;
    use crate::store::LeaderboardDocument;

    fn leaderboard(document: serde_json::Value) -> Leaderboard {
        let document: LeaderboardDocument = serde_json::from_value(document).unwrap();
        Leaderboard::from_document(TrueSkillConfig::new(), document).unwrap()
    }

    #[test]
    fn combinations_in_lexicographic_order() {
        let mut indices = vec![0, 1];
        let mut seen = vec![indices.clone()];
        while next_combination(&mut indices, 4) {
            seen.push(indices.clone());
        }

        assert_eq!(
            seen,
            vec![vec![0, 1], vec![0, 2], vec![0, 3], vec![1, 2], vec![1, 3], vec![2, 3]]
        );
    }

    #[test]
    fn pairs_strong_with_weak() {
        // Conservative scores: Alice 30, Bob 20, Carol 12, Dan 2.
        let leaderboard = leaderboard(json!({
            "Alice": {"mu": 36.0, "sigma": 2.0},
            "Bob": {"mu": 26.0, "sigma": 2.0},
            "Carol": {"mu": 18.0, "sigma": 2.0},
            "Dan": {"mu": 8.0, "sigma": 2.0}
        }));

        let split = balance_teams(&["Alice", "Bob", "Carol", "Dan"], &leaderboard).unwrap();

        assert_eq!(split.team_a, ["Alice", "Dan"]);
        assert_eq!(split.team_b, ["Bob", "Carol"]);
        assert_eq_float!(split.score_a, 32.0);
        assert_eq_float!(split.score_b, 32.0);
        assert!(split.quality > 0.0 && split.quality <= 1.0);
        assert!((split.win_probability_a - 0.5).abs() < 0.2);
    }

    #[test]
    fn first_minimum_wins() {
        let leaderboard = Leaderboard::default();

        let split = balance_teams(&["Dan", "Carol", "Bob", "Alice"], &leaderboard).unwrap();

        assert_eq!(split.team_a, ["Dan", "Carol"]);
        assert_eq!(split.team_b, ["Bob", "Alice"]);
        assert!(split.score_a.abs() < 1e-9);
        assert!((split.win_probability_a - 0.5).abs() < 1e-6);
    }

    #[test]
    fn largest_group_still_balances() {
        let leaderboard = Leaderboard::default();
        let players: Vec<String> = (0..MAX_PLAYERS).map(|i| format!("Player {i}")).collect();

        let split = balance_teams(&players, &leaderboard).unwrap();

        assert_eq!(split.team_a.len(), MAX_PLAYERS / 2);
        assert_eq!(split.team_b.len(), MAX_PLAYERS / 2);
    }

    #[test]
    fn rejects_oversized_groups() {
        let leaderboard = Leaderboard::default();
        let players: Vec<String> = (0..MAX_PLAYERS + 2).map(|i| format!("Player {i}")).collect();

        assert_eq!(
            balance_teams(&players, &leaderboard),
            Err(Error::TooManyPlayers(MAX_PLAYERS + 2))
        );
    }

    #[test]
    fn rejects_odd_and_duplicate_players() {
        let leaderboard = Leaderboard::default();

        assert_eq!(
            balance_teams(&["Alice", "Bob", "Carol"], &leaderboard),
            Err(Error::UnevenPlayers(3))
        );
        assert_eq!(
            balance_teams::<&str>(&[], &leaderboard),
            Err(Error::UnevenPlayers(0))
        );
        assert_eq!(
            balance_teams(&["Alice", "Alice"], &leaderboard),
            Err(Error::DuplicatePlayer("Alice".to_string()))
        );
        let owned = vec!["Alice".to_string(), "Bob".to_string(), "Carol".to_string(), "Bob".to_string()];
        assert_eq!(
            balance_teams(&owned, &leaderboard),
            Err(Error::DuplicatePlayer("Bob".to_string()))
        );
    }
}
