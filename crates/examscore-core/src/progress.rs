//! Job events and the sinks that receive them.
//!
//! A job emits a non-decreasing sequence of `progress` events and then
//! exactly one terminal event: `file_ready` on success, `error` on failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Stage a progress event was emitted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Saving,
    Parsing,
    Scoring,
    Finalizing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saving => "saving",
            Self::Parsing => "parsing",
            Self::Scoring => "scoring",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// 0..=100, non-decreasing within a job.
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Rows scored so far (scoring stage only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl ProgressEvent {
    pub fn at(stage: Stage, percent: u8) -> Self {
        ProgressEvent {
            percent: percent.min(100),
            stage: Some(stage),
            current: None,
            total: None,
        }
    }

    /// Progress after `completed` of `total` rows have been scored.
    pub fn scoring(completed: usize, total: usize) -> Self {
        ProgressEvent {
            percent: scoring_percent(completed, total),
            stage: Some(Stage::Scoring),
            current: Some(completed),
            total: Some(total),
        }
    }
}

/// `min(40 + floor(60 * completed / total), 90)`.
pub fn scoring_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 40;
    }
    let step = (60 * completed.min(total) as u64) / total as u64;
    (40 + step).min(90) as u8
}

/// Wire envelope for everything a job reports to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(ProgressEvent),
    Error { message: String },
    FileReady { filename: String, data: Vec<u8> },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Receives job events in emission order.
///
/// Emission never fails the job; a sink that cannot deliver drops the event.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: JobEvent);
}

/// Forwards events into a bounded channel. A full channel applies
/// backpressure to the job.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<JobEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<JobEvent>) -> Self {
        ChannelSink { tx }
    }

    /// A sink and the receiving half of a channel holding `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<JobEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn emit(&self, event: JobEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("progress receiver dropped; event discarded");
        }
    }
}

/// Logs events instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn emit(&self, event: JobEvent) {
        match event {
            JobEvent::Progress(p) => info!(
                percent = p.percent,
                stage = p.stage.map(|s| s.as_str()),
                current = p.current,
                total = p.total,
                "progress"
            ),
            JobEvent::Error { message } => warn!(error = %message, "job error"),
            JobEvent::FileReady { filename, data } => {
                info!(%filename, size_bytes = data.len(), "file ready")
            }
        }
    }
}
