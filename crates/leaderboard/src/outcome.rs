use std::{collections::HashSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A malformed match outcome. Names the offending field and the violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("`{field}`: player names must not be empty")]
    EmptyName { field: &'static str },
    #[error("`{field}`: at least two distinct players required, got {count}")]
    NotEnoughPlayers { field: &'static str, count: usize },
    #[error("`{field}`: player `{player}` is listed more than once")]
    DuplicatePlayer { field: &'static str, player: String },
    #[error("`{field}`: a team needs at least one player")]
    EmptyTeam { field: &'static str },
    #[error("player `{0}` is on both teams")]
    PlayerOnBothTeams(String),
    #[error("at least two teams required, got {0}")]
    NotEnoughTeams(usize),
    #[error("{teams} teams but {ranks} ranks")]
    RankCountMismatch { teams: usize, ranks: usize },
}

/// Winning side of a team match, stored as `"Team A"` / `"Team B"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Winner {
    #[serde(rename = "Team A", alias = "team_a", alias = "Team 1")]
    TeamA,
    #[serde(rename = "Team B", alias = "team_b", alias = "Team 2")]
    TeamB,
}

/// A player's declared finishing rank in a free-for-all. Lower is better, equal ranks tie.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    pub player: String,
    pub rank: usize,
}

/// The participants of a match, shaped by the kind of match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", from = "StoredEntry")]
pub enum MatchKind {
    /// Strict finishing order, winner first.
    Individual { results: Vec<String> },
    /// Two sides, one of them won.
    Team {
        team_a: Vec<String>,
        team_b: Vec<String>,
        winner: Winner,
    },
    /// Every player with an explicit rank, ties allowed.
    FreeForAll { placements: Vec<Placement> },
    /// Any number of teams, `ranks[i]` is the rank of `teams[i]`. Lower is better, equal ranks tie.
    RankedTeams {
        teams: Vec<Vec<String>>,
        ranks: Vec<usize>,
    },
}

/// Tagged entries first, then the untagged shapes older writers produced.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Tagged(StoredKind),
    RankedTeams {
        teams: Vec<Vec<String>>,
        ranks: Vec<usize>,
    },
    Team {
        #[serde(alias = "team1")]
        team_a: Vec<String>,
        #[serde(alias = "team2")]
        team_b: Vec<String>,
        winner: Winner,
    },
}

impl From<StoredEntry> for MatchKind {
    fn from(entry: StoredEntry) -> Self {
        match entry {
            StoredEntry::Tagged(kind) => kind.into(),
            StoredEntry::RankedTeams { teams, ranks } => Self::RankedTeams { teams, ranks },
            StoredEntry::Team {
                team_a,
                team_b,
                winner,
            } => Self::Team {
                team_a,
                team_b,
                winner,
            },
        }
    }
}

/// Every entry shape found in history documents, including ones no longer written.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum StoredKind {
    #[serde(rename = "individual")]
    Individual { results: Vec<String> },
    #[serde(rename = "1v1")]
    HeadToHead {
        players: Vec<String>,
        winner: Option<String>,
    },
    #[serde(rename = "team")]
    Team {
        #[serde(alias = "team1")]
        team_a: Vec<String>,
        #[serde(alias = "team2")]
        team_b: Vec<String>,
        winner: Winner,
    },
    #[serde(rename = "free_for_all", alias = "ffa")]
    FreeForAll {
        #[serde(default)]
        placements: Vec<Placement>,
        #[serde(default)]
        players: Vec<String>,
        winner: Option<String>,
    },
    #[serde(rename = "ranked_teams")]
    RankedTeams {
        teams: Vec<Vec<String>>,
        ranks: Vec<usize>,
    },
}

impl From<StoredKind> for MatchKind {
    fn from(stored: StoredKind) -> Self {
        match stored {
            StoredKind::Individual { results } => Self::Individual { results },
            StoredKind::HeadToHead { players, winner } => Self::Individual {
                results: winner_first(players, winner.as_deref()),
            },
            StoredKind::Team {
                team_a,
                team_b,
                winner,
            } => Self::Team {
                team_a,
                team_b,
                winner,
            },
            StoredKind::FreeForAll {
                placements,
                players,
                winner,
            } if placements.is_empty() => Self::FreeForAll {
                placements: players
                    .into_iter()
                    .map(|player| Placement {
                        rank: usize::from(winner.as_deref().is_some_and(|w| w != player)),
                        player,
                    })
                    .collect(),
            },
            StoredKind::FreeForAll { placements, .. } => Self::FreeForAll { placements },
            StoredKind::RankedTeams { teams, ranks } => Self::RankedTeams { teams, ranks },
        }
    }
}

fn winner_first(mut players: Vec<String>, winner: Option<&str>) -> Vec<String> {
    if let Some(position) = winner.and_then(|w| players.iter().position(|p| p == w)) {
        let winner = players.remove(position);
        players.insert(0, winner);
    }
    players
}

/// One recorded match. Immutable once appended to a [`MatchHistory`](crate::history::MatchHistory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: MatchKind,
}

impl MatchOutcome {
    fn stamped(kind: MatchKind) -> Self {
        Self {
            id: Some(Uuid::new_v4()),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// A strict finishing order, winner first.
    pub fn individual<I, S>(results: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::stamped(MatchKind::Individual {
            results: results.into_iter().map(Into::into).collect(),
        })
    }

    pub fn team<A, B, S>(team_a: A, team_b: B, winner: Winner) -> Self
    where
        A: IntoIterator<Item = S>,
        B: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::stamped(MatchKind::Team {
            team_a: team_a.into_iter().map(Into::into).collect(),
            team_b: team_b.into_iter().map(Into::into).collect(),
            winner,
        })
    }

    /// `(team, rank)` pairs for a match between any number of teams.
    pub fn ranked_teams<I, T, S>(teams: I) -> Self
    where
        I: IntoIterator<Item = (T, usize)>,
        T: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (teams, ranks) = teams
            .into_iter()
            .map(|(members, rank)| {
                let members: Vec<String> = members.into_iter().map(Into::into).collect();
                (members, rank)
            })
            .unzip();
        Self::stamped(MatchKind::RankedTeams { teams, ranks })
    }

    /// `(player, rank)` pairs; rank 0 is first place and equal ranks share the place.
    pub fn free_for_all<I, S>(placements: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        Self::stamped(MatchKind::FreeForAll {
            placements: placements
                .into_iter()
                .map(|(player, rank)| Placement {
                    player: player.into(),
                    rank,
                })
                .collect(),
        })
    }

    /// Checks the shape of the outcome before it may be rated or recorded.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.kind {
            MatchKind::Individual { results } => {
                distinct_players("results", results.iter().map(String::as_str))?;
            }
            MatchKind::Team { team_a, team_b, .. } => {
                team("team_a", team_a)?;
                let b = team("team_b", team_b)?;
                if let Some(shared) = team_a.iter().find(|p| b.contains(p.as_str())) {
                    return Err(Error::PlayerOnBothTeams(shared.clone()));
                }
            }
            MatchKind::FreeForAll { placements } => {
                distinct_players("placements", placements.iter().map(|p| p.player.as_str()))?;
            }
            MatchKind::RankedTeams { teams, ranks } => {
                if teams.len() < 2 {
                    return Err(Error::NotEnoughTeams(teams.len()));
                }
                if teams.len() != ranks.len() {
                    return Err(Error::RankCountMismatch {
                        teams: teams.len(),
                        ranks: ranks.len(),
                    });
                }
                let mut seen = HashSet::new();
                for members in teams {
                    for name in team("teams", members)? {
                        if !seen.insert(name) {
                            return Err(Error::PlayerOnBothTeams(name.to_string()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Participant groups and their finishing ranks, in the order the engine consumes them.
    ///
    /// Free-for-all and ranked-team ranks are compacted, so declared ranks `[1, 1, 3]` become `[0, 0, 1]`.
    pub fn groups(&self) -> (Vec<Vec<&str>>, Vec<usize>) {
        match &self.kind {
            MatchKind::Individual { results } => (
                results.iter().map(|p| vec![p.as_str()]).collect(),
                (0..results.len()).collect(),
            ),
            MatchKind::Team {
                team_a,
                team_b,
                winner,
            } => (
                vec![
                    team_a.iter().map(String::as_str).collect(),
                    team_b.iter().map(String::as_str).collect(),
                ],
                match winner {
                    Winner::TeamA => vec![0, 1],
                    Winner::TeamB => vec![1, 0],
                },
            ),
            MatchKind::FreeForAll { placements } => (
                placements.iter().map(|p| vec![p.player.as_str()]).collect(),
                dense_ranks(placements.iter().map(|p| p.rank).collect()),
            ),
            MatchKind::RankedTeams { teams, ranks } => (
                teams
                    .iter()
                    .map(|members| members.iter().map(String::as_str).collect())
                    .collect(),
                dense_ranks(ranks.clone()),
            ),
        }
    }

    /// Distinct player names in order of appearance.
    pub fn players(&self) -> Vec<&str> {
        let names: Box<dyn Iterator<Item = &str> + '_> = match &self.kind {
            MatchKind::Individual { results } => Box::new(results.iter().map(String::as_str)),
            MatchKind::Team { team_a, team_b, .. } => {
                Box::new(team_a.iter().chain(team_b).map(String::as_str))
            }
            MatchKind::FreeForAll { placements } => {
                Box::new(placements.iter().map(|p| p.player.as_str()))
            }
            MatchKind::RankedTeams { teams, .. } => {
                Box::new(teams.iter().flatten().map(String::as_str))
            }
        };

        let mut seen = HashSet::new();
        names.filter(|name| seen.insert(*name)).collect()
    }
}

fn dense_ranks(declared: Vec<usize>) -> Vec<usize> {
    let mut distinct = declared.clone();
    distinct.sort_unstable();
    distinct.dedup();
    declared
        .into_iter()
        .map(|rank| distinct.partition_point(|&d| d < rank))
        .collect()
}

fn distinct_players<'a>(
    field: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(Error::EmptyName { field });
        }
        if !seen.insert(name) {
            return Err(Error::DuplicatePlayer {
                field,
                player: name.to_string(),
            });
        }
    }
    if seen.len() < 2 {
        return Err(Error::NotEnoughPlayers {
            field,
            count: seen.len(),
        });
    }
    Ok(())
}

fn team<'a>(field: &'static str, members: &'a [String]) -> Result<HashSet<&'a str>, Error> {
    if members.is_empty() {
        return Err(Error::EmptyTeam { field });
    }
    let mut seen = HashSet::new();
    for name in members {
        if name.trim().is_empty() {
            return Err(Error::EmptyName { field });
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::DuplicatePlayer {
                field,
                player: name.clone(),
            });
        }
    }
    Ok(seen)
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual { results } => write!(f, "individual: {}", results.join(" > ")),
            Self::Team {
                team_a,
                team_b,
                winner,
            } => {
                let (won, lost) = match winner {
                    Winner::TeamA => (team_a, team_b),
                    Winner::TeamB => (team_b, team_a),
                };
                write!(f, "team: [{}] beat [{}]", won.join(", "), lost.join(", "))
            }
            Self::FreeForAll { placements } => {
                let mut ordered: Vec<&Placement> = placements.iter().collect();
                ordered.sort_by_key(|p| p.rank);
                let listed: Vec<String> = ordered
                    .iter()
                    .map(|p| format!("{}#{}", p.player, p.rank + 1))
                    .collect();
                write!(f, "free-for-all: {}", listed.join(", "))
            }
            Self::RankedTeams { teams, ranks } => {
                let mut ordered: Vec<(&Vec<String>, &usize)> = teams.iter().zip(ranks).collect();
                ordered.sort_by_key(|(_, rank)| **rank);
                let listed: Vec<String> = ordered
                    .iter()
                    .map(|(members, rank)| format!("[{}]#{}", members.join(", "), *rank + 1))
                    .collect();
                write!(f, "teams: {}", listed.join(", "))
            }
        }
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.timestamp.format("%Y-%m-%d %H:%M UTC"), self.kind)
    }
}

/// RFC 3339 on write. On read also the zone-less forms older documents hold, taken as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("unrecognized timestamp `{raw}`")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
            return Some(timestamp.with_timezone(&Utc));
        }
        NAIVE_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .map(|naive| naive.and_utc())
    }
}
