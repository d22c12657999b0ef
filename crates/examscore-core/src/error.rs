//! Error taxonomy for examscore.
//!
//! Row-level errors ([`ApiError`], [`crate::domain::ScoreError`]) are absorbed
//! into a zero score by the row processor. Job-level errors surface as a single
//! [`PipelineError`] and one terminal `error` event.

use std::time::Duration;

use thiserror::Error;

/// Credential issuance or validation failed.
#[derive(Error, Debug)]
pub enum AuthError {
    /// No API key or static token was configured.
    #[error("no credential source configured")]
    NotConfigured,

    /// The issuing endpoint could not be reached.
    #[error("credential endpoint unreachable: {message}")]
    Network { message: String },

    /// The issuing endpoint rejected the exchange.
    #[error("credential exchange rejected: HTTP {status} - {body}")]
    Rejected { status: u16, body: String },

    /// The issuing endpoint answered with an unexpected body.
    #[error("invalid credential response: {message}")]
    InvalidResponse { message: String },

    /// The lightweight probe did not accept the token.
    #[error("credential probe failed: {message}")]
    ProbeFailed { message: String },
}

/// A single scoring call failed.
///
/// The raw body is kept for diagnostics only; it is never parsed as a score.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("scoring request timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring request failed: {message}")]
    Network { message: String },

    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed model response: {message}")]
    Malformed { message: String, body: String },
}

impl ApiError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(timeout)
        } else {
            ApiError::Network {
                message: err.to_string(),
            }
        }
    }
}

/// The input dataset cannot be scored.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("input is not valid {encoding}: {message}")]
    Encoding {
        encoding: &'static str,
        message: String,
    },

    #[error("malformed table: {0}")]
    Malformed(String),

    #[error("required column missing: {0}")]
    MissingColumn(String),

    #[error("no valid rows to score")]
    NoValidRows,
}

impl From<csv::Error> for DataError {
    fn from(err: csv::Error) -> Self {
        DataError::Malformed(err.to_string())
    }
}

/// Job-level failure. Aborts the batch and is reported as one error event.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid job stage transition: {current} -> {requested}")]
    InvalidTransition { current: String, requested: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration could not be validated.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {field} URL {value:?}: {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

impl From<reqwest::Error> for ConfigError {
    fn from(err: reqwest::Error) -> Self {
        ConfigError::HttpClient(err.to_string())
    }
}
