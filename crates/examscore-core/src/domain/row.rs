//! Exam rows and their question-dependent score ranges.

use serde::{Deserialize, Serialize};

/// One exam question/answer pair that passed the validity predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub question_number: i64,
    pub question_text: String,
    pub answer_text: String,
}

impl Row {
    /// Build a row from raw cells, or `None` if the row must not be scored.
    ///
    /// All three cells must be non-empty and the question number must be an
    /// integer.
    pub fn from_cells(question_number: &str, question_text: &str, answer_text: &str) -> Option<Row> {
        let question_number = parse_question_number(question_number)?;
        if question_text.is_empty() || answer_text.is_empty() {
            return None;
        }
        Some(Row {
            question_number,
            question_text: question_text.to_string(),
            answer_text: answer_text.to_string(),
        })
    }

    pub fn score_range(&self) -> ScoreRange {
        ScoreRange::for_question(self.question_number)
    }
}

/// Parse a nullable integer question number.
///
/// Spreadsheet exports sometimes write integers as `2.0`; a fractional part
/// made only of zeros is accepted.
pub fn parse_question_number(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Some(n);
    }
    let (whole, frac) = cell.split_once('.')?;
    if frac.is_empty() || !frac.bytes().all(|b| b == b'0') {
        return None;
    }
    whole.parse().ok()
}

/// Inclusive bounds a question may be scored within.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: i64,
    pub max: i64,
}

impl ScoreRange {
    /// Questions 1 and 3 are scored 0..=1, everything else 0..=2.
    pub fn for_question(question_number: i64) -> ScoreRange {
        match question_number {
            1 | 3 => ScoreRange { min: 0, max: 1 },
            _ => ScoreRange { min: 0, max: 2 },
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}
