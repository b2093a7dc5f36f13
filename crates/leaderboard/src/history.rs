use serde::{Deserialize, Serialize};

use crate::outcome::MatchOutcome;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("nothing to undo: the match history is empty")]
    NothingToUndo,
}

/// Ordered, append-only log of the matches played in one game, oldest first.
///
/// Stored as `{"matches": [...]}`. A document without `matches` reads as an empty log,
/// and a bare array of matches is accepted on read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredHistory")]
pub struct MatchHistory {
    matches: Vec<MatchOutcome>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHistory {
    Document {
        #[serde(default)]
        matches: Vec<MatchOutcome>,
    },
    List(Vec<MatchOutcome>),
}

impl From<StoredHistory> for MatchHistory {
    fn from(stored: StoredHistory) -> Self {
        match stored {
            StoredHistory::Document { matches } | StoredHistory::List(matches) => Self { matches },
        }
    }
}

impl MatchHistory {
    pub const fn new() -> Self {
        Self {
            matches: Vec::new(),
        }
    }

    /// Adds `outcome` after every recorded match. The outcome is not validated here.
    pub fn append(&mut self, outcome: MatchOutcome) {
        self.matches.push(outcome);
    }

    /// Every recorded match in insertion order.
    pub fn all(&self) -> &[MatchOutcome] {
        &self.matches
    }

    /// Removes and returns the most recent match.
    pub fn remove_last(&mut self) -> Result<MatchOutcome, Error> {
        self.matches.pop().ok_or(Error::NothingToUndo)
    }

    pub fn clear(&mut self) {
        self.matches.clear();
    }

    pub fn last(&self) -> Option<&MatchOutcome> {
        self.matches.last()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl From<Vec<MatchOutcome>> for MatchHistory {
    fn from(matches: Vec<MatchOutcome>) -> Self {
        Self { matches }
    }
}

impl<'a> IntoIterator for &'a MatchHistory {
    type Item = &'a MatchOutcome;
    type IntoIter = std::slice::Iter<'a, MatchOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.matches.iter()
    }
}
