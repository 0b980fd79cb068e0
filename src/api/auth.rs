/// Token acquisition against the identity service and the shared token slot
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use url::Url;

use crate::error::TelemetryError;

// Tokens are refreshed this long before the identity service says they expire
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Bearer token plus its lifetime as reported by the identity service
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_in_seconds: u64,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self) -> Result<AccessToken, TelemetryError>;
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
    pub client_id: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// OAuth2 password-grant client for the identity service
pub struct HttpAuthProvider {
    client: reqwest::Client,
    token_url: Url,
    credentials: Credentials,
}

impl HttpAuthProvider {
    pub fn new(client: reqwest::Client, token_url: Url, credentials: Credentials) -> Self {
        HttpAuthProvider {
            client,
            token_url,
            credentials,
        }
    }
}

#[async_trait]
impl AuthProvider for HttpAuthProvider {
    async fn authenticate(&self) -> Result<AccessToken, TelemetryError> {
        let params = [
            ("grant_type", "password"),
            ("client_id", self.credentials.client_id.as_str()),
            ("username", self.credentials.username.as_str()),
            ("password", self.credentials.secret.as_str()),
        ];

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| TelemetryError::Auth(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Auth(format!(
                "token endpoint returned {}",
                status
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TelemetryError::Auth(format!("invalid token response: {}", e)))?;

        Ok(AccessToken {
            token: body.access_token,
            expires_in_seconds: body.expires_in,
        })
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: OffsetDateTime,
}

/// Single-slot token cache owned by whoever drives the enrichment passes
///
/// The slot lock is held across a refresh, so concurrent callers that find
/// the token expired wait for one fetch instead of each starting their own.
pub struct TokenCache {
    provider: Arc<dyn AuthProvider>,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        TokenCache {
            provider,
            slot: Mutex::new(None),
        }
    }

    /// Return a bearer token that is valid now, refreshing it if needed
    pub async fn get_valid_token(&self) -> Result<String, TelemetryError> {
        self.token_at(OffsetDateTime::now_utc()).await
    }

    /// Drop the cached token so the next call re-authenticates
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    async fn token_at(&self, now: OffsetDateTime) -> Result<String, TelemetryError> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if now < cached.expires_at {
                return Ok(cached.token.clone());
            }
            debug!("Cached token expired, refreshing");
        }

        let fresh = self.provider.authenticate().await?;
        let expires_at = now + Duration::seconds(usable_lifetime(fresh.expires_in_seconds));
        info!("Obtained new access token valid for {} seconds", fresh.expires_in_seconds);

        *slot = Some(CachedToken {
            token: fresh.token.clone(),
            expires_at,
        });

        Ok(fresh.token)
    }
}

// Short-lived tokens give up at most half their lifetime to the margin
fn usable_lifetime(expires_in_seconds: u64) -> i64 {
    let lifetime = expires_in_seconds.min(u32::MAX as u64) as i64;
    lifetime - EXPIRY_MARGIN_SECS.min(lifetime / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        expires_in_seconds: u64,
    }

    impl CountingProvider {
        fn new(expires_in_seconds: u64) -> Arc<Self> {
            Arc::new(CountingProvider {
                calls: AtomicUsize::new(0),
                expires_in_seconds,
            })
        }
    }

    #[async_trait]
    impl AuthProvider for CountingProvider {
        async fn authenticate(&self) -> Result<AccessToken, TelemetryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(AccessToken {
                token: format!("token-{}", n),
                expires_in_seconds: self.expires_in_seconds,
            })
        }
    }

    struct RejectingProvider;

    #[async_trait]
    impl AuthProvider for RejectingProvider {
        async fn authenticate(&self) -> Result<AccessToken, TelemetryError> {
            Err(TelemetryError::Auth("invalid credentials".into()))
        }
    }

    #[tokio::test]
    async fn reuses_token_until_expiry() {
        let provider = CountingProvider::new(3600);
        let cache = TokenCache::new(provider.clone());
        let now = OffsetDateTime::now_utc();

        assert_eq!(cache.token_at(now).await.unwrap(), "token-1");
        assert_eq!(cache.token_at(now + Duration::minutes(30)).await.unwrap(), "token-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refreshes_inside_expiry_margin() {
        let provider = CountingProvider::new(3600);
        let cache = TokenCache::new(provider.clone());
        let now = OffsetDateTime::now_utc();

        cache.token_at(now).await.unwrap();
        let refreshed = cache.token_at(now + Duration::seconds(3600 - 30)).await.unwrap();

        assert_eq!(refreshed, "token-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn short_lived_token_is_still_reused() {
        let provider = CountingProvider::new(30);
        let cache = TokenCache::new(provider.clone());
        let now = OffsetDateTime::now_utc();

        cache.token_at(now).await.unwrap();
        assert_eq!(cache.token_at(now + Duration::seconds(10)).await.unwrap(), "token-1");
        assert_eq!(cache.token_at(now + Duration::seconds(20)).await.unwrap(), "token-2");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn lifetime_margin_scales_down() {
        assert_eq!(usable_lifetime(3600), 3540);
        assert_eq!(usable_lifetime(30), 15);
        assert_eq!(usable_lifetime(0), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let provider = CountingProvider::new(3600);
        let cache = TokenCache::new(provider.clone());

        let tokens = join_all((0..8).map(|_| cache.get_valid_token())).await;

        assert!(tokens.iter().all(|t| t.as_deref().ok() == Some("token-1")));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_reauthentication() {
        let provider = CountingProvider::new(3600);
        let cache = TokenCache::new(provider.clone());

        cache.get_valid_token().await.unwrap();
        cache.invalidate().await;
        assert_eq!(cache.get_valid_token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn auth_failure_propagates_and_leaves_slot_empty() {
        let cache = TokenCache::new(Arc::new(RejectingProvider));

        let err = cache.get_valid_token().await.unwrap_err();
        assert!(matches!(err, TelemetryError::Auth(_)));
        assert!(cache.slot.lock().await.is_none());
    }
}
