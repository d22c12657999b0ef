//! Scoring configuration.
//!
//! Every endpoint, timeout and sampling literal lives here and is injected
//! once into the credential backend and the scoring client.

use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_MODEL: &str = "yandexgpt-lite";
pub const DEFAULT_COMPLETION_ENDPOINT: &str =
    "https://llm.api.cloud.yandex.net/foundationModels/v1/completion";
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.api.cloud.yandex.net/iam/v1/tokens";
pub const DEFAULT_PROBE_BASE: &str =
    "https://resource-manager.api.cloud.yandex.net/resource-manager/v1/folders";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Where the short-lived bearer token comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Long-lived key exchanged at the IAM endpoint.
    ApiKey(String),
    /// Pre-issued IAM token used as-is (still probed before use).
    StaticToken(String),
}

impl std::fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::StaticToken(_) => f.write_str("StaticToken(<redacted>)"),
        }
    }
}

/// Configuration for the model, credential and probe endpoints.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Cloud folder that owns the model.
    pub folder_id: String,
    /// Model name inside the folder, e.g. `yandexgpt-lite`.
    pub model: String,
    /// Long-lived credential, if configured.
    pub credential_source: Option<CredentialSource>,
    /// Token exchange endpoint.
    pub iam_endpoint: Url,
    /// Completion endpoint.
    pub completion_endpoint: Url,
    /// Read-only probe endpoint; defaults to the folder resource.
    pub probe_endpoint: Option<Url>,
    /// Timeout for one scoring call.
    pub request_timeout: Duration,
    /// Timeout for one credential probe.
    pub probe_timeout: Duration,
    /// How long an issued credential is trusted.
    pub credential_ttl: Duration,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl GraderConfig {
    /// Create a config for `folder_id` with every other setting at its default.
    pub fn new(folder_id: impl Into<String>) -> Self {
        GraderConfig {
            folder_id: folder_id.into(),
            model: DEFAULT_MODEL.to_string(),
            credential_source: None,
            iam_endpoint: Url::parse(DEFAULT_IAM_ENDPOINT).expect("default IAM endpoint is valid"),
            completion_endpoint: Url::parse(DEFAULT_COMPLETION_ENDPOINT)
                .expect("default completion endpoint is valid"),
            probe_endpoint: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_credential_source(mut self, source: CredentialSource) -> Self {
        self.credential_source = Some(source);
        self
    }

    /// Override the token exchange endpoint. The value must be an absolute http(s) URL.
    pub fn with_iam_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigError> {
        self.iam_endpoint = parse_endpoint("iam endpoint", endpoint)?;
        Ok(self)
    }

    pub fn with_completion_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigError> {
        self.completion_endpoint = parse_endpoint("completion endpoint", endpoint)?;
        Ok(self)
    }

    pub fn with_probe_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigError> {
        self.probe_endpoint = Some(parse_endpoint("probe endpoint", endpoint)?);
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// `gpt://<folder>/<model>/latest`
    pub fn model_uri(&self) -> String {
        format!("gpt://{}/{}/latest", self.folder_id, self.model)
    }

    /// The probe endpoint, falling back to the folder resource URL.
    pub fn probe_url(&self) -> Result<Url, ConfigError> {
        match &self.probe_endpoint {
            Some(url) => Ok(url.clone()),
            None => parse_endpoint(
                "probe endpoint",
                &format!("{}/{}", DEFAULT_PROBE_BASE, self.folder_id),
            ),
        }
    }

    /// Check that the settings needed for a scoring run are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folder_id.trim().is_empty() {
            return Err(ConfigError::Missing("folder id"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("model"));
        }
        if self.credential_source.is_none() {
            return Err(ConfigError::Missing("api key or IAM token"));
        }
        self.probe_url()?;
        Ok(())
    }
}

/// Parse an endpoint, accepting only absolute `http`/`https` URLs with a host.
pub fn parse_endpoint(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason,
    };

    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
