//! Validated examiner scores.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::row::Row;

/// Why a model reply could not be used as a score.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoreError {
    #[error("empty reply")]
    Empty,

    #[error("reply is not an integer: {0:?}")]
    NotAnInteger(String),

    #[error("score {0} outside 0..=2")]
    OutOfRange(i64),
}

/// An examiner score, always within `0..=2`.
///
/// The bound is global: a reply of `2` for a question whose own range is
/// `0..=1` is still accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Score(u8);

impl Score {
    pub const MIN: i64 = 0;
    pub const MAX: i64 = 2;

    /// Score used whenever the reply is absent or unusable.
    pub const FALLBACK: Score = Score(0);

    /// Build a score, rejecting values outside `0..=2`.
    pub fn new(value: i64) -> Result<Score, ScoreError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Score(value as u8))
        } else {
            Err(ScoreError::OutOfRange(value))
        }
    }

    /// Collapse a reply into a score, falling back to 0.
    ///
    /// The error that forced the fallback is handed back for logging.
    pub fn from_reply(reply: &str) -> (Score, Option<ScoreError>) {
        match parse_score(reply) {
            Ok(score) => (score, None),
            Err(e) => (Score::FALLBACK, Some(e)),
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a model reply as a base-10 integer within `0..=2`.
pub fn parse_score(reply: &str) -> Result<Score, ScoreError> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(ScoreError::Empty);
    }
    let value: i64 = reply
        .parse()
        .map_err(|_| ScoreError::NotAnInteger(reply.to_string()))?;
    Score::new(value)
}

/// A row together with the score it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredRow {
    pub row: Row,
    pub score: Score,
}
