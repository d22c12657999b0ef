//! Domain types: rows, score ranges and validated scores.

pub mod row;
pub mod score;

pub use row::{parse_question_number, Row, ScoreRange};
pub use score::{parse_score, Score, ScoreError, ScoredRow};
