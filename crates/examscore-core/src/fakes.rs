//! In-memory fakes for the scoring, credential and progress seams (testing only)
//!
//! Provides scoring clients with canned replies, a scriptable credential
//! backend and a sink that records every event, with no network access.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::credential::{Credential, CredentialBackend, IssuedToken};
use crate::error::{ApiError, AuthError};
use crate::progress::{JobEvent, ProgressSink};
use crate::scoring::ScoringClient;

// ---------------------------------------------------------------------------
// Scoring clients
// ---------------------------------------------------------------------------

/// Answers every prompt with the same reply and records the prompts.
#[derive(Debug, Default)]
pub struct StubScoringClient {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl StubScoringClient {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoringClient for StubScoringClient {
    async fn complete(&self, prompt: &str, _credential: &Credential) -> Result<String, ApiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Replies from a script, one entry per call. `None` entries and calls past
/// the end of the script fail with HTTP 500.
#[derive(Debug, Default)]
pub struct ScriptedScoringClient {
    replies: Mutex<VecDeque<Option<String>>>,
    tokens: Mutex<Vec<String>>,
}

impl ScriptedScoringClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Credential tokens seen, one per call.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScoringClient for ScriptedScoringClient {
    async fn complete(&self, _prompt: &str, credential: &Credential) -> Result<String, ApiError> {
        self.tokens.lock().unwrap().push(credential.token().to_string());
        match self.replies.lock().unwrap().pop_front().flatten() {
            Some(reply) => Ok(reply),
            None => Err(ApiError::Status {
                status: 500,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

/// Fails every call with HTTP 500.
#[derive(Debug, Default)]
pub struct FailingScoringClient {
    calls: AtomicUsize,
}

impl FailingScoringClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoringClient for FailingScoringClient {
    async fn complete(&self, _prompt: &str, _credential: &Credential) -> Result<String, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::Status {
            status: 500,
            body: "internal error".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Credential backend that issues tokens from a list and rejects a set of
/// tokens at probe time. Issuing past the end of the list is a network error.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    tokens: Mutex<VecDeque<String>>,
    rejected: Mutex<HashSet<String>>,
    issue_calls: AtomicUsize,
    probed: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn issuing<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: Mutex::new(tokens.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// A backend whose issuing endpoint is unreachable.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn rejecting<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rejected
            .lock()
            .unwrap()
            .extend(tokens.into_iter().map(Into::into));
        self
    }

    /// Make the probe reject `token` from now on.
    pub fn revoke(&self, token: &str) {
        self.rejected.lock().unwrap().insert(token.to_string());
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probed.lock().unwrap().len()
    }

    pub fn probed_tokens(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialBackend for ScriptedBackend {
    async fn issue(&self) -> Result<IssuedToken, AuthError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        match self.tokens.lock().unwrap().pop_front() {
            Some(token) => Ok(IssuedToken {
                token,
                expires_at: None,
            }),
            None => Err(AuthError::Network {
                message: "issuer unreachable".to_string(),
            }),
        }
    }

    async fn probe(&self, token: &str) -> Result<(), AuthError> {
        self.probed.lock().unwrap().push(token.to_string());
        if self.rejected.lock().unwrap().contains(token) {
            Err(AuthError::ProbeFailed {
                message: "HTTP 401 Unauthorized".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// CollectingSink
// ---------------------------------------------------------------------------

/// Records every job event in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<JobEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Percent of every progress event, in order.
    pub fn percents(&self) -> Vec<u8> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                JobEvent::Progress(p) => Some(p.percent),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn emit(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
    }
}
