//! Refreshable bearer credential for the tabular source.
//!
//! The token is reused while unexpired; otherwise it is refreshed
//! synchronously before the fetch that needs it. A failed refresh is
//! propagated without caching anything, so the caller's fetch fails cleanly
//! and the next call retries.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::info;

use crate::config::SheetsAuthConfig;
use crate::error::SheetsError;

/// Safety margin subtracted from the reported lifetime so a token is never
/// used right at its expiry edge.
const EXPIRY_SKEW: Duration = Duration::from_secs(100);

/// A bearer token with its expiry instant.
#[derive(Clone)]
pub struct Credential {
    pub token: SecretString,
    pub expires_at: Instant,
}

impl Credential {
    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Source of fresh credentials.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn refresh(&self) -> Result<Credential, SheetsError>;
}

/// Caches the current credential; refreshes only when expired.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    current: Mutex<Option<Credential>>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            current: Mutex::new(None),
        }
    }

    /// The cached token while `now < expiry`, otherwise a fresh one.
    ///
    /// The lock is held across the refresh so concurrent callers trigger at
    /// most one refresh.
    pub async fn token(&self) -> Result<SecretString, SheetsError> {
        let mut current = self.current.lock().await;

        if let Some(credential) = current.as_ref()
            && credential.is_valid()
        {
            return Ok(credential.token.clone());
        }

        let fresh = self.source.refresh().await?;
        info!("Access credential refreshed");
        let token = fresh.token.clone();
        *current = Some(fresh);
        Ok(token)
    }

    /// Drop the cached credential. Operational tooling only.
    pub async fn clear(&self) {
        *self.current.lock().await = None;
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// OAuth refresh-token exchange over HTTP.
pub struct OAuthCredentialSource {
    http: reqwest::Client,
    auth: SheetsAuthConfig,
}

impl OAuthCredentialSource {
    pub fn new(http: reqwest::Client, auth: SheetsAuthConfig) -> Self {
        Self { http, auth }
    }
}

#[async_trait]
impl CredentialSource for OAuthCredentialSource {
    async fn refresh(&self) -> Result<Credential, SheetsError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.auth.client_id.as_str()),
            ("client_secret", self.auth.client_secret.expose_secret()),
            ("refresh_token", self.auth.refresh_token.expose_secret()),
        ];

        let response = self
            .http
            .post(&self.auth.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| SheetsError::CredentialRefresh(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::CredentialRefresh(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| SheetsError::CredentialRefresh(format!("bad token response: {e}")))?;

        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(EXPIRY_SKEW);
        Ok(Credential {
            token: SecretString::from(parsed.access_token),
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        refreshes: AtomicUsize,
        lifetime: Duration,
        fail: bool,
    }

    impl CountingSource {
        fn new(lifetime: Duration) -> Arc<Self> {
            Arc::new(Self {
                refreshes: AtomicUsize::new(0),
                lifetime,
                fail: false,
            })
        }
    }

    #[async_trait]
    impl CredentialSource for CountingSource {
        async fn refresh(&self) -> Result<Credential, SheetsError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SheetsError::CredentialRefresh("denied".into()));
            }
            Ok(Credential {
                token: SecretString::from(format!(
                    "tok-{}",
                    self.refreshes.load(Ordering::SeqCst)
                )),
                expires_at: Instant::now() + self.lifetime,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn token_is_reused_until_expiry() {
        let source = CountingSource::new(Duration::from_secs(3600));
        let cache = CredentialCache::new(source.clone());

        let first = cache.token().await.unwrap();
        let second = cache.token().await.unwrap();
        assert_eq!(first.expose_secret(), second.expose_secret());
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(3601)).await;
        let third = cache.token().await.unwrap();
        assert_ne!(first.expose_secret(), third.expose_secret());
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_caches_nothing() {
        let source = Arc::new(CountingSource {
            refreshes: AtomicUsize::new(0),
            lifetime: Duration::from_secs(3600),
            fail: true,
        });
        let cache = CredentialCache::new(source.clone());

        assert!(cache.token().await.is_err());
        // Each call retries instead of being pinned to a cached failure.
        assert!(cache.token().await.is_err());
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 2);
    }
}
