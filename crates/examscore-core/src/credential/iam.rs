//! IAM token exchange and the read-only probe call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{CredentialBackend, IssuedToken};
use crate::config::{CredentialSource, GraderConfig};
use crate::error::{AuthError, ConfigError};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    yandex_passport_oauth_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    iam_token: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Credential backend talking to the IAM token endpoint.
///
/// With [`CredentialSource::StaticToken`] no exchange happens; the token is
/// handed back as-is and only the probe goes over the wire.
pub struct IamBackend {
    client: reqwest::Client,
    source: Option<CredentialSource>,
    iam_endpoint: Url,
    probe_endpoint: Url,
    folder_id: String,
    exchange_timeout: Duration,
    probe_timeout: Duration,
}

impl IamBackend {
    pub fn new(config: &GraderConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(format!("examscore/{}", crate::VERSION))
            .build()?;
        Ok(IamBackend {
            client,
            source: config.credential_source.clone(),
            iam_endpoint: config.iam_endpoint.clone(),
            probe_endpoint: config.probe_url()?,
            folder_id: config.folder_id.clone(),
            exchange_timeout: config.request_timeout,
            probe_timeout: config.probe_timeout,
        })
    }

    async fn exchange(&self, api_key: &str) -> Result<IssuedToken, AuthError> {
        let response = self
            .client
            .post(self.iam_endpoint.clone())
            .json(&TokenRequest {
                yandex_passport_oauth_token: api_key,
            })
            .timeout(self.exchange_timeout)
            .send()
            .await
            .map_err(|e| AuthError::Network {
                message: if e.is_timeout() {
                    format!("token exchange timed out after {:?}", self.exchange_timeout)
                } else {
                    format!("token exchange: {e}")
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| AuthError::InvalidResponse {
                    message: e.to_string(),
                })?;
        if parsed.iam_token.is_empty() {
            return Err(AuthError::InvalidResponse {
                message: "empty iamToken".to_string(),
            });
        }

        Ok(IssuedToken {
            token: parsed.iam_token,
            expires_at: parsed.expires_at,
        })
    }
}

#[async_trait]
impl CredentialBackend for IamBackend {
    async fn issue(&self) -> Result<IssuedToken, AuthError> {
        match &self.source {
            Some(CredentialSource::ApiKey(key)) => self.exchange(key).await,
            Some(CredentialSource::StaticToken(token)) => Ok(IssuedToken {
                token: token.clone(),
                expires_at: None,
            }),
            None => Err(AuthError::NotConfigured),
        }
    }

    async fn probe(&self, token: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .get(self.probe_endpoint.clone())
            .bearer_auth(token)
            .header("x-folder-id", &self.folder_id)
            .timeout(self.probe_timeout)
            .send()
            .await
            .map_err(|e| AuthError::ProbeFailed {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuthError::ProbeFailed {
                message: format!("HTTP {status}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_request_uses_wire_field_name() {
        let body = serde_json::to_value(TokenRequest {
            yandex_passport_oauth_token: "key",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"yandexPassportOauthToken": "key"}));
    }

    #[test]
    fn token_response_parses_expiry() {
        let parsed: TokenResponse = serde_json::from_str(
            r#"{"iamToken":"t1.abc","expiresAt":"2026-01-01T12:00:00.123456Z"}"#,
        )
        .unwrap();
        assert_eq!(parsed.iam_token, "t1.abc");
        assert!(parsed.expires_at.is_some());
    }

    #[test]
    fn token_response_tolerates_missing_expiry() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"iamToken":"t1"}"#).unwrap();
        assert!(parsed.expires_at.is_none());
    }

    #[tokio::test]
    async fn issue_without_source_is_not_configured() {
        let backend = IamBackend::new(&GraderConfig::new("f")).unwrap();
        assert!(matches!(backend.issue().await, Err(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn static_token_is_issued_without_exchange() {
        let config = GraderConfig::new("f")
            .with_credential_source(CredentialSource::StaticToken("t-static".into()));
        let backend = IamBackend::new(&config).unwrap();
        let issued = backend.issue().await.unwrap();
        assert_eq!(issued.token, "t-static");
        assert!(issued.expires_at.is_none());
    }
}
