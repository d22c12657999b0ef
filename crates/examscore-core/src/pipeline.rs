//! Batch scoring job orchestration.
//!
//! One job takes an uploaded table through
//! `Idle -> Saving -> Parsing -> Scoring -> Finalizing -> Done`, or into
//! `Failed` from any non-terminal stage. The job's temporary directory is
//! removed on every exit path.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::Instrument;
use uuid::Uuid;

use crate::credential::CredentialProvider;
use crate::dataset::{download_name, MissingScorePolicy, Table, TableFormat};
use crate::domain::{Row, ScoredRow};
use crate::error::{AuthError, DataError, PipelineError};
use crate::metrics::METRICS;
use crate::obs::{emit_job_failed, emit_job_finished, emit_job_started, emit_stage_entered, job_span};
use crate::processor::RowProcessor;
use crate::progress::{JobEvent, ProgressEvent, ProgressSink, Stage};
use crate::scoring::ScoringClient;

const FALLBACK_INPUT_NAME: &str = "upload.csv";

/// Lifecycle stage of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Idle,
    Saving,
    Parsing,
    Scoring,
    Finalizing,
    Done,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Parsing => "parsing",
            Self::Scoring => "scoring",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Forward by exactly one stage, or to `Failed` from a non-terminal stage.
    pub fn can_transition_to(&self, next: JobStage) -> bool {
        use JobStage::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Saving)
            | (Saving, Parsing)
            | (Parsing, Scoring)
            | (Scoring, Finalizing)
            | (Finalizing, Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct JobState {
    job_id: String,
    stage: JobStage,
}

impl JobState {
    fn advance(&mut self, next: JobStage) -> Result<(), PipelineError> {
        if !self.stage.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                current: self.stage.to_string(),
                requested: next.to_string(),
            });
        }
        self.stage = next;
        Ok(())
    }

    /// Move to `Failed` unless already terminal; returns the stage failed in.
    fn fail(&mut self) -> JobStage {
        let at = self.stage;
        if at.can_transition_to(JobStage::Failed) {
            self.stage = JobStage::Failed;
        }
        at
    }
}

/// Formats and policies for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub input_format: TableFormat,
    pub output_format: TableFormat,
    pub missing_score: MissingScorePolicy,
    /// Parent for per-job temp directories; the system temp dir when `None`.
    pub temp_root: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn new() -> Self {
        PipelineOptions {
            input_format: TableFormat::input(),
            output_format: TableFormat::output(),
            missing_score: MissingScorePolicy::Blank,
            temp_root: None,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// An uploaded table.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl JobInput {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        JobInput {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    /// Records in the input table.
    pub rows_total: usize,
    /// Records that passed validation and were scored.
    pub rows_scored: usize,
    pub duration_ms: u64,
}

/// The annotated table produced by a successful job.
#[derive(Debug, Clone)]
pub struct JobArtifact {
    pub filename: String,
    pub data: Vec<u8>,
    pub summary: JobSummary,
}

/// Runs scoring jobs against a shared credential provider.
pub struct BatchPipeline {
    provider: Arc<CredentialProvider>,
    processor: RowProcessor,
    options: PipelineOptions,
}

impl BatchPipeline {
    pub fn new(provider: Arc<CredentialProvider>, client: Arc<dyn ScoringClient>) -> Self {
        BatchPipeline {
            provider,
            processor: RowProcessor::new(client),
            options: PipelineOptions::new(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run one job, reporting to `sink`.
    ///
    /// On success the last two events are `progress(100)` and `file_ready`.
    /// On failure exactly one `error` event is emitted and no artifact exists.
    pub async fn run(
        &self,
        input: JobInput,
        sink: &dyn ProgressSink,
    ) -> Result<JobArtifact, PipelineError> {
        let mut state = JobState {
            job_id: Uuid::new_v4().to_string(),
            stage: JobStage::Idle,
        };
        let span = job_span(&state.job_id);

        async move {
            match self.execute(&mut state, input, sink).await {
                Ok(artifact) => {
                    METRICS.inc_jobs_completed();
                    METRICS.flush();
                    Ok(artifact)
                }
                Err(e) => {
                    let failed_at = state.fail();
                    emit_job_failed(&state.job_id, failed_at.as_str(), &e);
                    METRICS.inc_jobs_failed();
                    METRICS.flush();
                    sink.emit(JobEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        state: &mut JobState,
        input: JobInput,
        sink: &dyn ProgressSink,
    ) -> Result<JobArtifact, PipelineError> {
        let start = Instant::now();
        let digest = hex::encode(Sha256::digest(&input.bytes));
        emit_job_started(&state.job_id, &input.filename, input.bytes.len(), &digest);

        let temp = self.temp_dir()?;
        let name = local_name(&input.filename);

        state.advance(JobStage::Saving)?;
        tokio::fs::write(temp.path().join(&name), &input.bytes).await?;
        report(state, sink, ProgressEvent::at(Stage::Saving, 20)).await;

        state.advance(JobStage::Parsing)?;
        let raw = tokio::fs::read(temp.path().join(&name)).await?;
        let mut table = Table::parse(&raw, &self.options.input_format)?;
        report(state, sink, ProgressEvent::at(Stage::Parsing, 40)).await;
        let indexed = table.extract_rows()?;
        if indexed.is_empty() {
            return Err(DataError::NoValidRows.into());
        }

        state.advance(JobStage::Scoring)?;
        emit_stage_entered(&state.job_id, JobStage::Scoring.as_str(), 40);
        let (positions, rows): (Vec<usize>, Vec<Row>) = indexed.into_iter().unzip();
        let scored = self
            .score_rows(&rows, |completed, total, _| {
                sink.emit(JobEvent::Progress(ProgressEvent::scoring(completed, total)))
            })
            .await?;

        state.advance(JobStage::Finalizing)?;
        let scores: Vec<_> = positions
            .into_iter()
            .zip(scored.iter().map(|s| s.score))
            .collect();
        table.annotate(&scores, self.options.missing_score);
        report(state, sink, ProgressEvent::at(Stage::Finalizing, 90)).await;

        let output_path = temp.path().join(format!("processed_{name}"));
        let encoded = table.to_bytes(&self.options.output_format)?;
        tokio::fs::write(&output_path, &encoded).await?;
        let data = tokio::fs::read(&output_path).await?;

        state.advance(JobStage::Done)?;
        report(state, sink, ProgressEvent::at(Stage::Done, 100)).await;

        let summary = JobSummary {
            job_id: state.job_id.clone(),
            rows_total: table.len(),
            rows_scored: scored.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        emit_job_finished(
            &summary.job_id,
            summary.duration_ms,
            summary.rows_total,
            summary.rows_scored,
        );

        let filename = download_name(chrono::Local::now().naive_local());
        sink.emit(JobEvent::FileReady {
            filename: filename.clone(),
            data: data.clone(),
        })
        .await;

        Ok(JobArtifact {
            filename,
            data,
            summary,
        })
    }

    /// Score `rows` in order, calling `on_row(completed, total, scored)`
    /// after each one.
    ///
    /// A credential is acquired before every row. Only an [`AuthError`] with
    /// no cached credential to fall back on stops the fold.
    pub async fn score_rows<F, Fut>(
        &self,
        rows: &[Row],
        mut on_row: F,
    ) -> Result<Vec<ScoredRow>, AuthError>
    where
        F: FnMut(usize, usize, &ScoredRow) -> Fut,
        Fut: Future<Output = ()>,
    {
        let total = rows.len();
        let mut scored = Vec::with_capacity(total);
        for (index, row) in rows.iter().enumerate() {
            let grant = self.provider.get_credential().await?;
            let result = self.processor.process(row, &grant.credential, index).await;
            on_row(index + 1, total, &result).await;
            scored.push(result);
        }
        Ok(scored)
    }

    fn temp_dir(&self) -> Result<TempDir, PipelineError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("examscore-");
        let dir = match &self.options.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

async fn report(state: &JobState, sink: &dyn ProgressSink, event: ProgressEvent) {
    emit_stage_entered(&state.job_id, state.stage.as_str(), event.percent);
    sink.emit(JobEvent::Progress(event)).await;
}

/// Final path component of an uploaded name, so it cannot escape the job dir.
fn local_name(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_INPUT_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_allowed_one_step_at_a_time() {
        use JobStage::*;
        let order = [Idle, Saving, Parsing, Scoring, Finalizing, Done];
        for pair in order.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!Idle.can_transition_to(Parsing));
        assert!(!Scoring.can_transition_to(Saving));
        assert!(!Done.can_transition_to(Idle));
    }

    #[test]
    fn failed_is_reachable_only_from_non_terminal_stages() {
        use JobStage::*;
        for stage in [Idle, Saving, Parsing, Scoring, Finalizing] {
            assert!(stage.can_transition_to(Failed));
        }
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn invalid_transition_is_an_error() {
        let mut state = JobState {
            job_id: "j".into(),
            stage: JobStage::Idle,
        };
        let err = state.advance(JobStage::Scoring).unwrap_err();
        assert_eq!(err.to_string(), "invalid job stage transition: idle -> scoring");
        assert_eq!(state.stage, JobStage::Idle);
    }

    #[test]
    fn fail_records_the_stage_it_left() {
        let mut state = JobState {
            job_id: "j".into(),
            stage: JobStage::Parsing,
        };
        assert_eq!(state.fail(), JobStage::Parsing);
        assert_eq!(state.stage, JobStage::Failed);
    }

    #[test]
    fn local_name_strips_directories() {
        assert_eq!(local_name("../../etc/passwd"), "passwd");
        assert_eq!(local_name("dir/answers.csv"), "answers.csv");
        assert_eq!(local_name(""), FALLBACK_INPUT_NAME);
        assert_eq!(local_name(".."), FALLBACK_INPUT_NAME);
    }
}
