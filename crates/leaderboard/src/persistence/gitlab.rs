use std::collections::BTreeSet;

use reqwest::{Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error, warn};

use crate::{
    history::MatchHistory,
    persistence::{
        Error, GameName, Persistence,
        endpoints::{
            CREATE_FILE_PATH, CommitFileBody, DOCUMENTS_DIR, FILE_EXISTS_PATH, FILES_SEGMENTS,
            PAGE_SIZE, RAW_FILE_PATH, TOKEN_HEADER, TREE_PATH, TreeEntry, UPDATE_FILE_PATH,
        },
    },
    settings::Settings,
    store::LeaderboardDocument,
};

/// Stores every game as two JSON files in a GitLab repository, through the repository files API.
#[derive(Debug, Clone)]
pub struct GitLabStore {
    http_client: reqwest::Client,
    /// GITLAB_API_URL/projects/GITLAB_PROJECT_ID
    project_url: Url,
    /// GITLAB_BRANCH
    branch: String,
    /// GITLAB_TOKEN
    token: String,
}

impl GitLabStore {
    pub fn new(http_client: reqwest::Client, settings: &Settings) -> Result<Self, Error> {
        let mut project_url = Url::parse(&settings.api_url)
            .map_err(|err| Error::InvalidUrl(format!("`{}`: {err}", settings.api_url)))?;
        project_url
            .path_segments_mut()
            .map_err(|()| Error::InvalidUrl(format!("`{}` cannot be a base", settings.api_url)))?
            .pop_if_empty()
            // Pushed as one segment, so `namespace/project` is sent as `namespace%2Fproject`.
            .extend(["projects", settings.project_id.as_str()]);

        Ok(Self {
            http_client,
            project_url,
            branch: settings.branch.clone(),
            token: settings.gitlab_token.clone(),
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.project_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn file_url(&self, path: &str, suffix: &[&str]) -> Url {
        let mut segments = FILES_SEGMENTS.to_vec();
        segments.push(path);
        segments.extend(suffix);
        self.url(&segments)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header(TOKEN_HEADER, &self.token)
    }

    async fn unexpected(method: Method, path: &str, response: reqwest::Response) -> Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Error::UnexpectedStatus {
            method,
            path: path.to_string(),
            status,
            body,
        }
    }

    /// Reads and parses a document. An absent or blank file is the empty document.
    async fn read_document<T>(&self, path: &str) -> Result<T, Error>
    where
        T: DeserializeOwned + Default,
    {
        let (method, suffix) = RAW_FILE_PATH;
        let response = self
            .request(method.clone(), self.file_url(path, suffix))
            .query(&[("ref", &self.branch)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                warn!("`{path}` not found on `{}`. Using an empty document.", self.branch);
                Ok(T::default())
            }
            status if status.is_success() => {
                let content = response.text().await?;
                debug!("read `{path}` ({} bytes)", content.len());
                if content.trim().is_empty() {
                    return Ok(T::default());
                }
                serde_json::from_str(&content).map_err(|source| Error::Corrupt {
                    path: path.to_string(),
                    source,
                })
            }
            _ => Err(Self::unexpected(method, path, response).await),
        }
    }

    async fn file_exists(&self, path: &str) -> Result<bool, Error> {
        let (method, suffix) = FILE_EXISTS_PATH;
        let response = self
            .request(method.clone(), self.file_url(path, suffix))
            .query(&[("ref", &self.branch)])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::unexpected(method, path, response).await),
        }
    }

    /// Commits `document` as pretty-printed JSON, updating the file or creating it.
    async fn write_document<T>(&self, path: &str, document: &T, commit_message: String) -> Result<(), Error>
    where
        T: Serialize,
    {
        let content = serde_json::to_string_pretty(document)?;
        let body = CommitFileBody::text(&self.branch, content, commit_message);

        let (method, suffix) = if self.file_exists(path).await? {
            UPDATE_FILE_PATH
        } else {
            CREATE_FILE_PATH
        };
        let response = self
            .request(method.clone(), self.file_url(path, suffix))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::unexpected(method, path, response).await;
            error!("GitLab rejected write: {err}");
            return Err(err);
        }
        debug!("{method} `{path}` on `{}`", self.branch);
        Ok(())
    }
}

impl Persistence for GitLabStore {
    async fn load_leaderboard(&self, game: &GameName) -> Result<LeaderboardDocument, Error> {
        self.read_document(&game.leaderboard_path()).await
    }

    async fn save_leaderboard(&self, game: &GameName, leaderboard: &LeaderboardDocument) -> Result<(), Error> {
        self.write_document(
            &game.leaderboard_path(),
            leaderboard,
            format!("Update {game} leaderboard"),
        )
        .await
    }

    async fn load_history(&self, game: &GameName) -> Result<MatchHistory, Error> {
        self.read_document(&game.history_path()).await
    }

    async fn save_history(&self, game: &GameName, history: &MatchHistory) -> Result<(), Error> {
        self.write_document(&game.history_path(), history, format!("Update {game} history"))
            .await
    }

    async fn list_games(&self) -> Result<Vec<GameName>, Error> {
        let (method, segments) = TREE_PATH;
        let per_page = PAGE_SIZE.to_string();
        let mut games = BTreeSet::new();
        let mut page = 1usize;

        loop {
            let response = self
                .request(method.clone(), self.url(segments))
                .query(&[
                    ("path", DOCUMENTS_DIR),
                    ("ref", self.branch.as_str()),
                    ("per_page", per_page.as_str()),
                    ("page", page.to_string().as_str()),
                ])
                .send()
                .await?;

            match response.status() {
                StatusCode::NOT_FOUND => {
                    warn!("`{DOCUMENTS_DIR}` not found on `{}`. No games yet.", self.branch);
                    break;
                }
                status if !status.is_success() => {
                    return Err(Self::unexpected(method, DOCUMENTS_DIR, response).await);
                }
                _ => {}
            }

            let listing = response.text().await?;
            let entries: Vec<TreeEntry> =
                serde_json::from_str(&listing).map_err(|source| Error::Corrupt {
                    path: DOCUMENTS_DIR.to_string(),
                    source,
                })?;

            let count = entries.len();
            games.extend(
                entries
                    .iter()
                    .filter(|entry| entry.is_file())
                    .filter_map(|entry| GameName::from_file_name(&entry.name)),
            );

            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        Ok(games.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use httpmock::{
        Method::{GET, POST, PUT},
        MockServer,
    };
    use serde_json::json;

    use super::*;
    use crate::{outcome::MatchOutcome, store::StoredRating};

    const LEADERBOARD_RAW: &str = "/projects/42/repository/files/leaderboards%2Fchess_leaderboard.json/raw";
    const LEADERBOARD_FILE: &str = "/projects/42/repository/files/leaderboards%2Fchess_leaderboard.json";
    const HISTORY_FILE: &str = "/projects/42/repository/files/leaderboards%2Fchess_history.json";

    fn store(server: &MockServer, project_id: &str) -> GitLabStore {
        let settings = Settings {
            gitlab_token: "secret".to_string(),
            project_id: project_id.to_string(),
            branch: "main".to_string(),
            api_url: server.base_url(),
            log_level: tracing::Level::INFO,
        };
        GitLabStore::new(reqwest::Client::new(), &settings).unwrap()
    }

    fn chess() -> GameName {
        GameName::parse("Chess").unwrap()
    }

    #[tokio::test]
    async fn loads_leaderboard() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(LEADERBOARD_RAW)
                    .query_param("ref", "main")
                    .header("private-token", "secret");
                then.status(200)
                    .body(r#"{"Alice": {"mu": 30.0, "sigma": 5.0, "wins": 1}, "Bob": [20.0, 6.0]}"#);
            })
            .await;

        let document = store(&server, "42").load_leaderboard(&chess()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(document.0.len(), 2);
        assert_eq!(document.0["Alice"].wins, 1);
        assert_eq!(document.0["Bob"].sigma, 6.0);
    }

    #[tokio::test]
    async fn missing_documents_are_empty() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(404)
                    .json_body(json!({"message": "404 File Not Found"}));
            })
            .await;
        let store = store(&server, "42");

        assert!(store.load_leaderboard(&chess()).await.unwrap().0.is_empty());
        assert!(store.load_history(&chess()).await.unwrap().is_empty());
        assert!(store.list_games().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(LEADERBOARD_RAW);
                then.status(200).body("<html>not json</html>");
            })
            .await;

        let err = store(&server, "42").load_leaderboard(&chess()).await.unwrap_err();

        assert!(
            matches!(&err, Error::Corrupt { path, .. } if path == "leaderboards/chess_leaderboard.json"),
            "{err}"
        );
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn updates_existing_file() {
        let server = MockServer::start_async().await;
        let document = LeaderboardDocument(BTreeMap::from([(
            "Alice".to_string(),
            StoredRating {
                mu: 30.0,
                sigma: 5.0,
                wins: 1,
                played: 2,
            },
        )]));
        let content = serde_json::to_string_pretty(&document).unwrap();

        let exists = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path(LEADERBOARD_FILE)
                    .query_param("ref", "main");
                then.status(200)
                    .json_body(json!({"file_path": "leaderboards/chess_leaderboard.json"}));
            })
            .await;
        let update = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path(LEADERBOARD_FILE)
                    .header("private-token", "secret")
                    .json_body(json!({
                        "branch": "main",
                        "content": content,
                        "commit_message": "Update chess leaderboard",
                        "encoding": "text"
                    }));
                then.status(200)
                    .json_body(json!({"file_path": "leaderboards/chess_leaderboard.json", "branch": "main"}));
            })
            .await;

        store(&server, "42")
            .save_leaderboard(&chess(), &document)
            .await
            .unwrap();

        exists.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn creates_missing_file() {
        let server = MockServer::start_async().await;
        let mut history = MatchHistory::new();
        history.append(MatchOutcome::individual(["Alice", "Bob"]));
        let content = serde_json::to_string_pretty(&history).unwrap();

        server
            .mock_async(|when, then| {
                when.method(GET).path(HISTORY_FILE);
                then.status(404)
                    .json_body(json!({"message": "404 File Not Found"}));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(POST).path(HISTORY_FILE).json_body(json!({
                    "branch": "main",
                    "content": content,
                    "commit_message": "Update chess history",
                    "encoding": "text"
                }));
                then.status(201)
                    .json_body(json!({"file_path": "leaderboards/chess_history.json", "branch": "main"}));
            })
            .await;

        store(&server, "42").save_history(&chess(), &history).await.unwrap();

        create.assert_async().await;
    }

    #[tokio::test]
    async fn failed_write_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(HISTORY_FILE);
                then.status(200).json_body(json!({}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path(HISTORY_FILE);
                then.status(503).body("maintenance");
            })
            .await;

        let err = store(&server, "42")
            .save_history(&chess(), &MatchHistory::new())
            .await
            .unwrap_err();

        assert!(err.is_transient(), "{err}");
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn lists_games_from_tree() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/projects/42/repository/tree")
                    .query_param("path", "leaderboards")
                    .query_param("ref", "main")
                    .query_param("per_page", "100")
                    .query_param("page", "1");
                then.status(200).json_body(json!([
                    {"id": "1", "name": "chess_leaderboard.json", "type": "blob", "path": "leaderboards/chess_leaderboard.json", "mode": "100644"},
                    {"id": "2", "name": "chess_history.json", "type": "blob", "path": "leaderboards/chess_history.json", "mode": "100644"},
                    {"id": "3", "name": "darts_history.json", "type": "blob", "path": "leaderboards/darts_history.json", "mode": "100644"},
                    {"id": "4", "name": "players.json", "type": "blob", "path": "leaderboards/players.json", "mode": "100644"},
                    {"id": "5", "name": "old_leaderboard.json", "type": "tree", "path": "leaderboards/old_leaderboard.json", "mode": "040000"}
                ]));
            })
            .await;

        let games = store(&server, "42").list_games().await.unwrap();

        mock.assert_async().await;
        let names: Vec<&str> = games.iter().map(GameName::as_str).collect();
        assert_eq!(names, ["chess", "darts"]);
    }

    #[tokio::test]
    async fn project_path_is_encoded() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/projects/games%2Fleaderboards/repository/files/leaderboards%2Fchess_history.json/raw");
                then.status(200).body(r#"{"matches": []}"#);
            })
            .await;

        let history = store(&server, "games/leaderboards")
            .load_history(&chess())
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(history.is_empty());
    }
}
