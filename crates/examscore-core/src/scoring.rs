//! Completion calls against the model endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::GraderConfig;
use crate::credential::Credential;
use crate::error::{ApiError, ConfigError};

/// One prompt in, one raw reply out.
#[async_trait]
pub trait ScoringClient: Send + Sync {
    /// Send `prompt` authorised with `credential` and return the trimmed reply.
    async fn complete(&self, prompt: &str, credential: &Credential) -> Result<String, ApiError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest<'a> {
    model_uri: String,
    completion_options: CompletionOptions,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionOptions {
    stream: bool,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    result: CompletionResult,
}

#[derive(Debug, Deserialize)]
struct CompletionResult {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    text: String,
}

/// Client for the Foundation Models completion API.
///
/// Each call is a single request bounded by the configured timeout; failures
/// are returned, never retried.
pub struct YandexGptClient {
    client: reqwest::Client,
    endpoint: Url,
    folder_id: String,
    model_uri: String,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl YandexGptClient {
    pub fn new(config: &GraderConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("examscore/{}", crate::VERSION))
            .timeout(config.request_timeout)
            .build()?;
        Ok(YandexGptClient {
            client,
            endpoint: config.completion_endpoint.clone(),
            folder_id: config.folder_id.clone(),
            model_uri: config.model_uri(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.request_timeout,
        })
    }

    fn request_body<'a>(&self, prompt: &'a str) -> CompletionRequest<'a> {
        CompletionRequest {
            model_uri: self.model_uri.clone(),
            completion_options: CompletionOptions {
                stream: false,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            },
            messages: [Message {
                role: "user",
                text: prompt,
            }],
        }
    }
}

#[async_trait]
impl ScoringClient for YandexGptClient {
    async fn complete(&self, prompt: &str, credential: &Credential) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(credential.token())
            .header("x-folder-id", &self.folder_id)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(e, self.timeout))?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        extract_reply(&body)
    }
}

/// Pull `result.alternatives[0].message.text` out of a response body.
fn extract_reply(body: &str) -> Result<String, ApiError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Malformed {
            message: e.to_string(),
            body: body.to_string(),
        })?;
    parsed
        .result
        .alternatives
        .into_iter()
        .next()
        .map(|alt| alt.message.text.trim().to_string())
        .ok_or_else(|| ApiError::Malformed {
            message: "no alternatives in result".to_string(),
            body: body.to_string(),
        })
}
