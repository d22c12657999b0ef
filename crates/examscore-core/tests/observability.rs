//! Observability tests for the batch job lifecycle.
//!
//! `#[traced_test]` installs a capturing subscriber; `logs_contain` checks
//! what the emitters and the pipeline wrote.

use std::sync::Arc;
use std::time::Duration;

use examscore_core::fakes::{CollectingSink, ScriptedBackend, StubScoringClient};
use examscore_core::obs::{
    emit_credential_degraded, emit_job_failed, emit_job_finished, emit_job_started,
    emit_stage_entered, job_span,
};
use examscore_core::{
    BatchPipeline, CredentialProvider, JobEvent, JobInput, PipelineOptions, ProgressEvent,
    ProgressSink, Stage, TracingSink,
};
use tracing::Instrument;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn job_started_logs_filename_and_digest() {
    emit_job_started("job-1", "answers.csv", 128, "abc123");
    assert!(logs_contain("job.started"));
    assert!(logs_contain("answers.csv"));
    assert!(logs_contain("abc123"));
}

#[traced_test]
#[test]
fn stage_and_finish_events_are_logged() {
    emit_stage_entered("job-2", "scoring", 40);
    emit_job_finished("job-2", 1500, 10, 8);
    assert!(logs_contain("job.stage"));
    assert!(logs_contain("job.finished"));
}

#[traced_test]
#[test]
fn failures_log_at_warn() {
    emit_job_failed("job-3", "parsing", &"no valid rows to score");
    emit_credential_degraded(&"issuer unreachable");
    assert!(logs_contain("WARN"));
    assert!(logs_contain("job.failed"));
    assert!(logs_contain("credential.degraded"));
}

#[tokio::test]
#[traced_test]
async fn job_span_tags_events_with_job_id() {
    async {
        emit_stage_entered("job-span-test", "saving", 20);
    }
    .instrument(job_span("job-span-test"))
    .await;
    assert!(logs_contain("examscore.job"));
}

#[tokio::test]
#[traced_test]
async fn pipeline_run_emits_lifecycle_events() {
    let backend = Arc::new(ScriptedBackend::issuing(["t1"]));
    let provider = Arc::new(CredentialProvider::new(backend, Duration::from_secs(3600)));
    let temp_root = tempfile::tempdir().unwrap();
    let pipeline = BatchPipeline::new(provider, Arc::new(StubScoringClient::new("2"))).with_options(
        PipelineOptions {
            temp_root: Some(temp_root.path().to_path_buf()),
            ..PipelineOptions::new()
        },
    );

    let input = "№ вопроса;Текст вопроса;Транскрибация ответа\n2;Q;A\n";
    pipeline
        .run(JobInput::new("a.csv", input.as_bytes().to_vec()), &CollectingSink::new())
        .await
        .unwrap();

    assert!(logs_contain("job.started"));
    assert!(logs_contain("job.finished"));
    assert!(logs_contain("rows_scored"));
}

#[tokio::test]
#[traced_test]
async fn tracing_sink_logs_every_event_kind() {
    let sink = TracingSink;
    sink.emit(JobEvent::Progress(ProgressEvent::at(Stage::Parsing, 40)))
        .await;
    sink.emit(JobEvent::Progress(ProgressEvent::scoring(3, 4))).await;
    sink.emit(JobEvent::Error {
        message: "no valid rows to score".into(),
    })
    .await;
    sink.emit(JobEvent::FileReady {
        filename: "обработанный_20260105_090307.csv".into(),
        data: vec![0; 12],
    })
    .await;

    assert!(logs_contain("percent=40"));
    assert!(logs_contain("parsing"));
    assert!(logs_contain("current=3"));
    assert!(logs_contain("job error"));
    assert!(logs_contain("no valid rows to score"));
    assert!(logs_contain("file ready"));
    assert!(logs_contain("size_bytes=12"));
}
