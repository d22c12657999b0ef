//! Turns one row into a validated score.

use std::sync::Arc;

use tracing::debug;

use crate::credential::Credential;
use crate::domain::{Row, Score, ScoredRow};
use crate::metrics::METRICS;
use crate::obs::emit_row_scored;
use crate::prompt::build_prompt;
use crate::scoring::ScoringClient;

/// Prompts the model for a row and validates the reply.
///
/// Never fails: API errors and unusable replies become [`Score::FALLBACK`].
#[derive(Clone)]
pub struct RowProcessor {
    client: Arc<dyn ScoringClient>,
}

impl RowProcessor {
    pub fn new(client: Arc<dyn ScoringClient>) -> Self {
        RowProcessor { client }
    }

    /// Score `row`; `index` is its position among the rows being scored.
    pub async fn process(&self, row: &Row, credential: &Credential, index: usize) -> ScoredRow {
        let prompt = build_prompt(row);
        let reply = match self.client.complete(&prompt, credential).await {
            Ok(reply) => reply,
            Err(e) => {
                debug!(index, error = %e, "scoring call failed");
                String::new()
            }
        };

        let (score, reason) = Score::from_reply(&reply);
        let fallback = reason.is_some();
        if let Some(e) = reason {
            debug!(index, reason = %e, "using fallback score");
        }

        METRICS.inc_rows_scored();
        if fallback {
            METRICS.inc_score_fallbacks();
        }
        emit_row_scored(index, row.question_number, score.value(), fallback);

        ScoredRow {
            row: row.clone(),
            score,
        }
    }
}
