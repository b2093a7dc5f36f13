//! Per-game TrueSkill leaderboards backed by a replayable match history.
//!
//! Every game keeps two documents: the leaderboard (`player -> rating`) and the
//! history of matches that produced it. The leaderboard can always be rebuilt
//! from the history.

pub mod history;
pub mod matchmaking;
pub mod outcome;
pub mod persistence;
pub mod recorder;
pub mod settings;
pub mod store;

pub use history::MatchHistory;
pub use outcome::{MatchOutcome, Winner};
pub use persistence::{GameName, GitLabStore, MemoryStore, Persistence};
pub use recorder::Recorder;
pub use store::Leaderboard;
