use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use ratings::trueskill::TrueSkillConfig;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use crate::{
    history::{self, MatchHistory},
    matchmaking::{self, TeamSplit, balance_teams},
    outcome::{self, MatchOutcome},
    persistence::{self, GameName, Persistence},
    store::{self, Leaderboard, LeaderboardDocument, Ranked, RatingChange, progression},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Outcome(#[from] outcome::Error),
    #[error(transparent)]
    Store(#[from] store::Error),
    #[error(transparent)]
    History(#[from] history::Error),
    #[error("storage: {0}")]
    Persistence(#[from] persistence::Error),
    #[error(transparent)]
    Matchmaking(#[from] matchmaking::Error),
}

impl Error {
    /// Only transient storage faults are worth retrying. Anything else needs a different call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(err) if err.is_transient())
    }
}

/// Records matches into a [`Persistence`] backend, one writer per game at a time.
///
/// A recording loads the game's leaderboard and history, rates the match and writes both
/// documents back. If any step fails the match counts as not recorded.
#[derive(Debug)]
pub struct Recorder<P> {
    store: P,
    config: TrueSkillConfig,
    locks: Mutex<HashMap<GameName, Arc<Mutex<()>>>>,
}

impl<P: Persistence> Recorder<P> {
    pub fn new(store: P, config: TrueSkillConfig) -> Self {
        Self {
            store,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub const fn store(&self) -> &P {
        &self.store
    }

    pub const fn config(&self) -> &TrueSkillConfig {
        &self.config
    }

    async fn lock(&self, game: &GameName) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.lock().await.entry(game.clone()).or_default());
        lock.lock_owned().await
    }

    async fn load(&self, game: &GameName) -> Result<(LeaderboardDocument, MatchHistory), Error> {
        let (document, history) = tokio::try_join!(self.store.load_leaderboard(game), self.store.load_history(game))
            .inspect_err(|err| error!("failed to load `{game}`: {err}"))?;
        debug!("loaded `{game}`: {} players, {} matches", document.0.len(), history.len());
        Ok((document, history))
    }

    /// Writes the leaderboard, then the history. When the history write fails the
    /// `previous` leaderboard is written back, so both documents still agree and a retry
    /// does not count the match twice.
    async fn save(
        &self,
        game: &GameName,
        previous: &LeaderboardDocument,
        leaderboard: &LeaderboardDocument,
        history: &MatchHistory,
    ) -> Result<(), Error> {
        self.store
            .save_leaderboard(game, leaderboard)
            .await
            .inspect_err(|err| error!("failed to save `{game}` leaderboard: {err}"))?;

        if let Err(err) = self.store.save_history(game, history).await {
            error!("failed to save `{game}` history: {err}");
            match self.store.save_leaderboard(game, previous).await {
                Ok(()) => warn!("`{game}`: restored the previous leaderboard"),
                Err(rollback) => error!("failed to restore `{game}` leaderboard, run repair: {rollback}"),
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Rates `outcome` against the stored leaderboard and commits it to both documents.
    pub async fn record(&self, game: &GameName, outcome: MatchOutcome) -> Result<Vec<RatingChange>, Error> {
        outcome.validate()?;

        let _guard = self.lock(game).await;
        let (previous, mut history) = self.load(game).await?;
        let mut leaderboard = Leaderboard::from_document(self.config, previous.clone())?;

        let changes = leaderboard.apply_outcome(&outcome)?;
        let summary = outcome.to_string();
        history.append(outcome);

        self.save(game, &previous, &leaderboard.to_document(), &history).await?;
        info!("`{game}`: recorded {summary}");
        Ok(changes)
    }

    /// Drops the most recent match and recomputes the leaderboard from what is left.
    pub async fn undo(&self, game: &GameName) -> Result<MatchOutcome, Error> {
        let _guard = self.lock(game).await;
        let (previous, mut history) = self.load(game).await?;

        let undone = history.remove_last()?;
        let leaderboard = Leaderboard::replay(self.config, &history)?;

        self.save(game, &previous, &leaderboard.to_document(), &history).await?;
        info!("`{game}`: undid {undone}");
        Ok(undone)
    }

    /// Overwrites the stored leaderboard with a replay of the stored history.
    pub async fn repair(&self, game: &GameName) -> Result<Leaderboard, Error> {
        let _guard = self.lock(game).await;
        let history = self
            .store
            .load_history(game)
            .await
            .inspect_err(|err| error!("failed to load `{game}` history: {err}"))?;

        let leaderboard = Leaderboard::replay(self.config, &history)?;
        self.store
            .save_leaderboard(game, &leaderboard.to_document())
            .await
            .inspect_err(|err| error!("failed to save `{game}` leaderboard: {err}"))?;

        info!("`{game}`: rebuilt {} players from {} matches", leaderboard.len(), history.len());
        Ok(leaderboard)
    }

    /// Empties both documents of `game`. Safe to retry after a partial failure.
    pub async fn wipe(&self, game: &GameName) -> Result<(), Error> {
        let _guard = self.lock(game).await;
        self.store
            .save_leaderboard(game, &LeaderboardDocument::default())
            .await
            .inspect_err(|err| error!("failed to save `{game}` leaderboard: {err}"))?;
        self.store
            .save_history(game, &MatchHistory::new())
            .await
            .inspect_err(|err| error!("failed to save `{game}` history: {err}"))?;
        info!("`{game}`: wiped");
        Ok(())
    }

    pub async fn leaderboard(&self, game: &GameName) -> Result<Leaderboard, Error> {
        let document = self.store.load_leaderboard(game).await?;
        Ok(Leaderboard::from_document(self.config, document)?)
    }

    pub async fn standings(&self, game: &GameName) -> Result<Vec<Ranked>, Error> {
        Ok(self.leaderboard(game).await?.standings())
    }

    pub async fn history(&self, game: &GameName) -> Result<MatchHistory, Error> {
        Ok(self.store.load_history(game).await?)
    }

    /// Each player's mean after every match of `game`.
    pub async fn progression(&self, game: &GameName) -> Result<BTreeMap<String, Vec<f64>>, Error> {
        let history = self.history(game).await?;
        Ok(progression(self.config, &history)?)
    }

    pub async fn games(&self) -> Result<Vec<GameName>, Error> {
        Ok(self.store.list_games().await?)
    }

    /// Splits `players` into the two most even teams according to `game`'s ratings.
    pub async fn suggest_teams<S: AsRef<str> + Sync>(&self, game: &GameName, players: &[S]) -> Result<TeamSplit, Error> {
        let leaderboard = self.leaderboard(game).await?;
        Ok(balance_teams(players, &leaderboard)?)
    }
}
