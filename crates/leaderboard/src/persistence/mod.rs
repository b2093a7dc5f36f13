use std::{fmt, future::Future, str::FromStr};

use crate::{history::MatchHistory, store::LeaderboardDocument};

pub mod endpoints;
pub mod gitlab;
pub mod memory;

pub use gitlab::GitLabStore;
pub use memory::MemoryStore;

const LEADERBOARD_SUFFIX: &str = "_leaderboard";
const HISTORY_SUFFIX: &str = "_history";
const DOCUMENT_EXTENSION: &str = ".json";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("{method} `{path}` answered {status}: {body}")]
    UnexpectedStatus {
        method: reqwest::Method,
        path: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("`{path}` does not hold a valid document: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("invalid game name `{0}`")]
    InvalidGameName(String),
    #[error("invalid API url: {0}")]
    InvalidUrl(String),
}

impl Error {
    /// Transport faults and server-side statuses, worth retrying as is.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::UnexpectedStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

/// Normalized game namespace, used as a storage key.
///
/// Trimmed, lowercased, whitespace runs collapsed to `_`, and a trailing
/// `.json`, `_leaderboard` or `_history` stripped, so file names map back to their game.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameName(String);

impl GameName {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let lowered = raw.trim().to_lowercase();
        let mut name = lowered.split_whitespace().collect::<Vec<_>>().join("_");

        if let Some(stripped) = name.strip_suffix(DOCUMENT_EXTENSION) {
            name = stripped.to_string();
        }
        for suffix in [LEADERBOARD_SUFFIX, HISTORY_SUFFIX] {
            if let Some(stripped) = name.strip_suffix(suffix) {
                name = stripped.to_string();
                break;
            }
        }

        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::InvalidGameName(raw.to_string()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Repository path of this game's leaderboard document.
    pub fn leaderboard_path(&self) -> String {
        format!("{}/{}{LEADERBOARD_SUFFIX}{DOCUMENT_EXTENSION}", endpoints::DOCUMENTS_DIR, self.0)
    }

    /// Repository path of this game's history document.
    pub fn history_path(&self) -> String {
        format!("{}/{}{HISTORY_SUFFIX}{DOCUMENT_EXTENSION}", endpoints::DOCUMENTS_DIR, self.0)
    }

    /// The game a stored document belongs to, if the file name is one of ours.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(DOCUMENT_EXTENSION)?;
        if stem.ends_with(LEADERBOARD_SUFFIX) || stem.ends_with(HISTORY_SUFFIX) {
            Self::parse(stem).ok()
        } else {
            None
        }
    }
}

impl FromStr for GameName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GameName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GameName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where leaderboards and histories live between runs.
///
/// Absent documents load as empty ones. Saving creates or overwrites.
/// Any error means nothing was committed by that call.
pub trait Persistence: Send + Sync {
    fn load_leaderboard(
        &self,
        game: &GameName,
    ) -> impl Future<Output = Result<LeaderboardDocument, Error>> + Send;

    fn save_leaderboard(
        &self,
        game: &GameName,
        leaderboard: &LeaderboardDocument,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    fn load_history(&self, game: &GameName) -> impl Future<Output = Result<MatchHistory, Error>> + Send;

    fn save_history(
        &self,
        game: &GameName,
        history: &MatchHistory,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Every game with at least one stored document, sorted.
    fn list_games(&self) -> impl Future<Output = Result<Vec<GameName>, Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_names_are_normalized() {
        let cases = [
            ("Chess", "chess"),
            ("  Table   Tennis ", "table_tennis"),
            ("chess_leaderboard.json", "chess"),
            ("Mario Kart_history", "mario_kart"),
            ("rocket_league.json", "rocket_league"),
        ];

        for (raw, expected) in cases {
            assert_eq!(GameName::parse(raw).unwrap().as_str(), expected, "{raw}");
        }
    }

    #[test]
    fn invalid_game_names() {
        for raw in ["", "   ", "_leaderboard", "../secrets", "a/b", ".hidden"] {
            assert!(
                matches!(GameName::parse(raw), Err(Error::InvalidGameName(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn document_paths() {
        let game: GameName = "Table Tennis".parse().unwrap();

        assert_eq!(game.leaderboard_path(), "leaderboards/table_tennis_leaderboard.json");
        assert_eq!(game.history_path(), "leaderboards/table_tennis_history.json");
        assert_eq!(game.to_string(), "table_tennis");
    }

    #[test]
    fn game_from_file_name() {
        assert_eq!(
            GameName::from_file_name("chess_history.json"),
            Some(GameName::parse("chess").unwrap())
        );
        assert_eq!(GameName::from_file_name("players.json"), None);
        assert_eq!(GameName::from_file_name("chess_leaderboard.csv"), None);
    }

    #[test]
    fn transient_errors() {
        let server_side = Error::UnexpectedStatus {
            method: reqwest::Method::PUT,
            path: "leaderboards/chess_history.json".to_string(),
            status: reqwest::StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        let forbidden = Error::UnexpectedStatus {
            method: reqwest::Method::PUT,
            path: "leaderboards/chess_history.json".to_string(),
            status: reqwest::StatusCode::FORBIDDEN,
            body: String::new(),
        };

        assert!(server_side.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!Error::InvalidGameName(String::new()).is_transient());
    }
}
