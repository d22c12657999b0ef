//! examscore core library
//!
//! Scores free-text exam answers with a hosted language model. Re-exports the
//! credential provider, scoring client, dataset handling and batch pipeline.

pub mod config;
pub mod credential;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod prompt;
pub mod scoring;
pub mod telemetry;

pub use config::{CredentialSource, GraderConfig};
pub use credential::{
    Credential, CredentialBackend, CredentialGrant, CredentialProvider, Freshness, IamBackend,
    IssuedToken,
};
pub use dataset::{download_name, Encoding, MissingScorePolicy, Table, TableFormat};
pub use domain::{parse_score, Row, Score, ScoreError, ScoreRange, ScoredRow};
pub use error::{ApiError, AuthError, ConfigError, DataError, PipelineError};
pub use pipeline::{BatchPipeline, JobArtifact, JobInput, JobStage, JobSummary, PipelineOptions};
pub use processor::RowProcessor;
pub use progress::{ChannelSink, JobEvent, ProgressEvent, ProgressSink, Stage, TracingSink};
pub use prompt::build_prompt;
pub use scoring::{ScoringClient, YandexGptClient};

/// Crate version, sent in the `User-Agent` of outgoing requests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
