use std::str::FromStr;

use tracing::debug;

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";
pub const DEFAULT_LOG_LEVEL: tracing::Level = tracing::Level::INFO;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to load .env: {0}")]
    DotenvError(#[from] dotenv::Error),
    #[error(".env `{0}` not set")]
    MissingVariable(&'static str),
    #[error("`LOG_LEVEL` must be one of trace, debug, info, warn, error; got `{0}`")]
    InvalidLogLevel(String),
}

/// Connection and logging settings, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// GITLAB_TOKEN
    pub gitlab_token: String,
    /// GITLAB_PROJECT_ID, numeric id or `namespace/project`
    pub project_id: String,
    /// GITLAB_BRANCH
    pub branch: String,
    /// GITLAB_API_URL
    pub api_url: String,
    /// LOG_LEVEL
    pub log_level: tracing::Level,
}

impl Settings {
    pub fn try_from_env() -> Result<Self, Error> {
        match dotenv::dotenv() {
            Ok(path) => debug!("loaded {}", path.display()),
            Err(err) if err.not_found() => debug!("no .env file found. Using process environment."),
            Err(err) => return Err(err.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup, e.g. a map in tests.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let gitlab_token = get("GITLAB_TOKEN").ok_or(Error::MissingVariable("GITLAB_TOKEN"))?;
        let project_id = get("GITLAB_PROJECT_ID")
            .or_else(|| get("PROJECT_ID"))
            .ok_or(Error::MissingVariable("GITLAB_PROJECT_ID"))?;
        let branch = get("GITLAB_BRANCH")
            .or_else(|| get("BRANCH"))
            .unwrap_or_else(|| {
                debug!(".env `GITLAB_BRANCH` not found. Using default.");
                DEFAULT_BRANCH.to_string()
            });
        let api_url = get("GITLAB_API_URL").unwrap_or_else(|| {
            debug!(".env `GITLAB_API_URL` not found. Using default.");
            DEFAULT_API_URL.to_string()
        });
        let log_level = match get("LOG_LEVEL") {
            Some(level) => to_log_level(&level).ok_or(Error::InvalidLogLevel(level))?,
            None => {
                debug!(".env `LOG_LEVEL` not found. Using default.");
                DEFAULT_LOG_LEVEL
            }
        };

        Ok(Self {
            gitlab_token,
            project_id: project_id.trim().to_string(),
            branch,
            api_url: api_url.trim_end_matches('/').to_string(),
            log_level,
        })
    }
}

pub fn to_log_level(level: &str) -> Option<tracing::Level> {
    tracing::Level::from_str(&level.trim().to_uppercase()).ok()
}
