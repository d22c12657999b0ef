//! Structured observability hooks for the batch job lifecycle.
//!
//! This module provides:
//! - A job-scoped tracing span via [`job_span`]
//! - Emission functions for key lifecycle events: start, stage change, row
//!   scored, credential degradation, finish and failure
//!
//! Events are emitted at `info!` level (filter with `RUST_LOG`).

use tracing::{debug, info, warn};

/// Job-scoped span. Attach it to the job future with
/// [`tracing::Instrument::instrument`] so every event carries the job id.
///
/// # Example
///
/// ```ignore
/// run_job().instrument(job_span("4c1e...")).await;
/// ```
pub fn job_span(job_id: &str) -> tracing::Span {
    tracing::info_span!("examscore.job", job_id = %job_id)
}

/// Emit event: job accepted an input artifact.
pub fn emit_job_started(job_id: &str, filename: &str, size_bytes: usize, input_digest: &str) {
    info!(
        event = "job.started",
        job_id = %job_id,
        filename = %filename,
        size_bytes = size_bytes,
        input_digest = %input_digest,
    );
}

/// Emit event: job moved to a new stage.
pub fn emit_stage_entered(job_id: &str, stage: &str, percent: u8) {
    info!(event = "job.stage", job_id = %job_id, stage = %stage, percent = percent);
}

/// Emit event: one row received its score.
pub fn emit_row_scored(index: usize, question_number: i64, score: u8, fallback: bool) {
    debug!(
        event = "row.scored",
        index = index,
        question_number = question_number,
        score = score,
        fallback = fallback,
    );
}

/// Emit event: a stale credential was reused because refresh failed (warning level).
pub fn emit_credential_degraded(error: &dyn std::fmt::Display) {
    warn!(event = "credential.degraded", error = %error, "reusing cached credential after refresh failure");
}

/// Emit event: job finished and produced an artifact.
pub fn emit_job_finished(job_id: &str, duration_ms: u64, rows_total: usize, rows_scored: usize) {
    info!(
        event = "job.finished",
        job_id = %job_id,
        duration_ms = duration_ms,
        rows_total = rows_total,
        rows_scored = rows_scored,
    );
}

/// Emit event: job aborted (warning level).
pub fn emit_job_failed(job_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "job.failed", job_id = %job_id, stage = %stage, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_span_is_named() {
        let span = job_span("test-job-id");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "examscore.job");
        }
    }
}
