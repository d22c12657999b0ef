//! Short-lived credentials for the model endpoint.
//!
//! [`CredentialProvider`] owns a single cached credential. Every call to
//! [`CredentialProvider::get_credential`] probes the cached token, refreshes
//! it through a [`CredentialBackend`] when needed, and falls back to the stale
//! token if refresh fails.

pub mod iam;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::GraderConfig;
use crate::error::{AuthError, ConfigError};
use crate::metrics::METRICS;
use crate::obs::emit_credential_degraded;

pub use iam::IamBackend;

/// A bearer token with the moment it was issued and how long it is trusted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    issued_at: DateTime<Utc>,
    ttl: Duration,
}

impl Credential {
    pub fn new(token: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Credential {
            token: token.into(),
            issued_at,
            ttl,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.issued_at.checked_add_signed(ttl))
    }

    /// Whether the TTL has elapsed at `now`. A credential issued in the
    /// future (clock skew) is not expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.issued_at).to_std() {
            Ok(age) => age >= self.ttl,
            Err(_) => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("issued_at", &self.issued_at)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// A token fresh from the issuing endpoint.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiry reported by the issuer, if any. Informational only.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Issues and validates tokens.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// Exchange the long-lived key for a short-lived token.
    async fn issue(&self) -> Result<IssuedToken, AuthError>;

    /// Cheap read-only call that succeeds only if `token` is accepted.
    async fn probe(&self, token: &str) -> Result<(), AuthError>;
}

/// How the returned credential was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Cached token, still within its TTL and accepted by the probe.
    Cached,
    /// Newly issued and validated.
    Issued,
    /// Refresh failed; the last cached token is reused unvalidated.
    Degraded,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Issued => "issued",
            Self::Degraded => "degraded",
        }
    }
}

/// A credential handed to the scoring client.
#[derive(Debug, Clone)]
pub struct CredentialGrant {
    pub credential: Credential,
    pub freshness: Freshness,
}

impl CredentialGrant {
    pub fn is_degraded(&self) -> bool {
        self.freshness == Freshness::Degraded
    }
}

/// Caches one credential and refreshes it on demand.
///
/// The check-and-refresh sequence runs under an async mutex, so jobs sharing
/// one provider never issue concurrent refreshes.
pub struct CredentialProvider {
    backend: Arc<dyn CredentialBackend>,
    ttl: Duration,
    cached: Mutex<Option<Credential>>,
}

impl CredentialProvider {
    pub fn new(backend: Arc<dyn CredentialBackend>, ttl: Duration) -> Self {
        CredentialProvider {
            backend,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Provider backed by the IAM token exchange described in `config`.
    pub fn from_config(config: &GraderConfig) -> Result<Self, ConfigError> {
        let backend = IamBackend::new(config)?;
        Ok(Self::new(Arc::new(backend), config.credential_ttl))
    }

    /// Return a validated credential, refreshing the cache when needed.
    ///
    /// Fails only when refresh fails and nothing was ever cached.
    pub async fn get_credential(&self) -> Result<CredentialGrant, AuthError> {
        let mut slot = self.cached.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.is_expired() {
                debug!("cached credential past its TTL");
            } else {
                match self.backend.probe(cached.token()).await {
                    Ok(()) => {
                        return Ok(CredentialGrant {
                            credential: cached.clone(),
                            freshness: Freshness::Cached,
                        });
                    }
                    Err(e) => debug!(error = %e, "cached credential rejected by probe"),
                }
            }
        }

        match self.refresh().await {
            Ok(credential) => {
                METRICS.inc_credentials_issued();
                *slot = Some(credential.clone());
                Ok(CredentialGrant {
                    credential,
                    freshness: Freshness::Issued,
                })
            }
            Err(e) => match slot.as_ref() {
                Some(stale) => {
                    METRICS.inc_credentials_degraded();
                    emit_credential_degraded(&e);
                    Ok(CredentialGrant {
                        credential: stale.clone(),
                        freshness: Freshness::Degraded,
                    })
                }
                None => Err(e),
            },
        }
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        let issued = self.backend.issue().await?;
        self.backend.probe(&issued.token).await?;
        debug!(expires_at = ?issued.expires_at, "issued new credential");
        Ok(Credential::new(issued.token, Utc::now(), self.ttl))
    }

    /// Snapshot of the cached credential.
    pub async fn cached(&self) -> Option<Credential> {
        self.cached.lock().await.clone()
    }

    /// Drop the cached credential; the next call issues a new one.
    pub async fn clear_cache(&self) {
        *self.cached.lock().await = None;
    }

    #[cfg(test)]
    async fn seed(&self, credential: Credential) {
        *self.cached.lock().await = Some(credential);
    }
}
