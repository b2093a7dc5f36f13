use std::collections::{BTreeMap, BTreeSet};

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{
    history::MatchHistory,
    persistence::{Error, GameName, Persistence, endpoints::DOCUMENTS_DIR},
    store::LeaderboardDocument,
};

/// In-process store keeping the same files, paths and JSON as [`GitLabStore`](super::GitLabStore).
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw file, e.g. a document written by an older version.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.get_mut().insert(path.into(), content.into());
        self
    }

    /// Raw content of a stored file.
    pub async fn file(&self, path: &str) -> Option<String> {
        self.files.read().await.get(path).cloned()
    }

    async fn read_document<T>(&self, path: &str) -> Result<T, Error>
    where
        T: DeserializeOwned + Default,
    {
        let files = self.files.read().await;
        match files.get(path) {
            Some(content) if !content.trim().is_empty() => {
                serde_json::from_str(content).map_err(|source| Error::Corrupt {
                    path: path.to_string(),
                    source,
                })
            }
            _ => Ok(T::default()),
        }
    }

    async fn write_document<T: Serialize>(&self, path: String, document: &T) -> Result<(), Error> {
        let content = serde_json::to_string_pretty(document)?;
        debug!("write `{path}` ({} bytes)", content.len());
        self.files.write().await.insert(path, content);
        Ok(())
    }
}

impl Persistence for MemoryStore {
    async fn load_leaderboard(&self, game: &GameName) -> Result<LeaderboardDocument, Error> {
        self.read_document(&game.leaderboard_path()).await
    }

    async fn save_leaderboard(&self, game: &GameName, leaderboard: &LeaderboardDocument) -> Result<(), Error> {
        self.write_document(game.leaderboard_path(), leaderboard).await
    }

    async fn load_history(&self, game: &GameName) -> Result<MatchHistory, Error> {
        self.read_document(&game.history_path()).await
    }

    async fn save_history(&self, game: &GameName, history: &MatchHistory) -> Result<(), Error> {
        self.write_document(game.history_path(), history).await
    }

    async fn list_games(&self) -> Result<Vec<GameName>, Error> {
        let prefix = format!("{DOCUMENTS_DIR}/");
        let games: BTreeSet<GameName> = self
            .files
            .read()
            .await
            .keys()
            .filter_map(|path| path.strip_prefix(&prefix))
            .filter(|name| !name.contains('/'))
            .filter_map(GameName::from_file_name)
            .collect();

        Ok(games.into_iter().collect())
    }
}
