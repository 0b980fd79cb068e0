/// HTTP client for the hydrometer telemetry API
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::api::auth::TokenCache;
use crate::error::TelemetryError;
use crate::models::{Device, Profile, RawSample};

const DEVICES_PATH: &str = "api/Hydrometers/GetHydrometers";
const TELEMETRY_PATH: &str = "api/Hydrometers/GetTelemetry";
const PROFILE_SESSIONS_PATH: &str = "api/ProfileSessions/GetAllProfileSessions";

/// Time range requested from the telemetry endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeWindow {
    /// Window ending at `now` and reaching back `hours`
    pub fn lookback(now: OffsetDateTime, hours: u32) -> Self {
        TimeWindow {
            start: now - Duration::hours(hours as i64),
            end: now,
        }
    }
}

/// Read access to devices, their telemetry and the profile sessions
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>, TelemetryError>;

    /// Fetch raw samples, restricted to `window` when one is given
    async fn get_telemetry(
        &self,
        device_id: &str,
        window: Option<TimeWindow>,
    ) -> Result<Vec<RawSample>, TelemetryError>;

    async fn get_profile_sessions(&self) -> Result<Vec<Profile>, TelemetryError>;
}

pub struct HttpTelemetrySource {
    client: reqwest::Client,
    base_url: Url,
    tokens: Arc<TokenCache>,
}

impl HttpTelemetrySource {
    pub fn new(client: reqwest::Client, base_url: Url, tokens: Arc<TokenCache>) -> Self {
        HttpTelemetrySource {
            client,
            base_url: with_trailing_slash(base_url),
            tokens,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, TelemetryError> {
        Ok(self.base_url.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TelemetryError> {
        let url = self.endpoint(path)?;
        let token = self.tokens.get_valid_token().await?;

        debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Access token rejected by {}, dropping cached token", url);
            self.tokens.invalidate().await;
        }
        if !status.is_success() {
            return Err(TelemetryError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn list_devices(&self) -> Result<Vec<Device>, TelemetryError> {
        self.get_json(DEVICES_PATH, &[])
            .await
            .map_err(|e| unless_auth(e, |other| TelemetryError::DeviceList(other.to_string())))
    }

    async fn get_telemetry(
        &self,
        device_id: &str,
        window: Option<TimeWindow>,
    ) -> Result<Vec<RawSample>, TelemetryError> {
        let query = telemetry_query(device_id, window)?;
        self.get_json(TELEMETRY_PATH, &query)
            .await
            .map_err(|e| {
                unless_auth(e, |other| TelemetryError::TelemetryFetch {
                    device_id: device_id.to_string(),
                    reason: other.to_string(),
                })
            })
    }

    async fn get_profile_sessions(&self) -> Result<Vec<Profile>, TelemetryError> {
        self.get_json(PROFILE_SESSIONS_PATH, &[])
            .await
            .map_err(|e| unless_auth(e, |other| TelemetryError::ProfileLookup(other.to_string())))
    }
}

// Auth failures keep their variant so callers can fail the whole pass
fn unless_auth<F>(err: TelemetryError, wrap: F) -> TelemetryError
where
    F: FnOnce(TelemetryError) -> TelemetryError,
{
    if err.is_auth() {
        err
    } else {
        wrap(err)
    }
}

/// Query parameters for the telemetry endpoint
fn telemetry_query(
    device_id: &str,
    window: Option<TimeWindow>,
) -> Result<Vec<(&'static str, String)>, TelemetryError> {
    let mut query = vec![("hydrometerId", device_id.to_string())];

    if let Some(window) = window {
        let format = |dt: OffsetDateTime| {
            dt.format(&Rfc3339).map_err(|e| TelemetryError::TelemetryFetch {
                device_id: device_id.to_string(),
                reason: format!("cannot format window bound: {}", e),
            })
        };
        query.push(("startDate", format(window.start)?));
        query.push(("endDate", format(window.end)?));
    }

    Ok(query)
}

// Url::join drops the last path segment unless the base ends with '/'
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{AccessToken, AuthProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct StaticProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl StaticProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(StaticProvider {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl AuthProvider for StaticProvider {
        async fn authenticate(&self) -> Result<AccessToken, TelemetryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TelemetryError::Auth("bad creds".into()));
            }
            Ok(AccessToken {
                token: "token".into(),
                expires_in_seconds: 3600,
            })
        }
    }

    /// Answer every request on a local port with the given status line
    async fn serve_status(status_line: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let mut read = 0;
                loop {
                    match stream.read(&mut buf[read..]).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            read += n;
                            let done = buf[..read].windows(4).any(|w| w == b"\r\n\r\n");
                            if done || read == buf.len() {
                                break;
                            }
                        }
                    }
                }
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status_line
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    fn source(base_url: Url, provider: Arc<StaticProvider>) -> HttpTelemetrySource {
        let tokens = Arc::new(TokenCache::new(provider));
        HttpTelemetrySource::new(reqwest::Client::new(), base_url, tokens)
    }

    #[tokio::test]
    async fn auth_failures_keep_their_variant() {
        // Token acquisition fails before any request is sent
        let base = Url::parse("http://127.0.0.1:9").unwrap();
        let source = source(base, StaticProvider::new(true));

        assert!(source.list_devices().await.unwrap_err().is_auth());
        assert!(source.get_telemetry("hyd-1", None).await.unwrap_err().is_auth());
        assert!(source.get_profile_sessions().await.unwrap_err().is_auth());
    }

    #[tokio::test]
    async fn rejected_token_is_dropped_and_device_list_fails() {
        let provider = StaticProvider::new(false);
        let source = source(serve_status("401 Unauthorized").await, provider.clone());

        let err = source.list_devices().await.unwrap_err();
        assert!(matches!(&err, TelemetryError::DeviceList(reason) if reason.contains("401")));

        source.list_devices().await.unwrap_err();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_errors_map_per_endpoint() {
        let provider = StaticProvider::new(false);
        let source = source(serve_status("500 Internal Server Error").await, provider.clone());

        let err = source.get_profile_sessions().await.unwrap_err();
        assert!(matches!(err, TelemetryError::ProfileLookup(_)));

        let err = source.get_telemetry("hyd-1", None).await.unwrap_err();
        assert!(matches!(
            err,
            TelemetryError::TelemetryFetch { ref device_id, .. } if device_id == "hyd-1"
        ));

        // A 500 does not invalidate the cached token
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lookback_window_spans_requested_hours() {
        let now = datetime!(2026-10-17 12:00 UTC);
        let window = TimeWindow::lookback(now, 24);
        assert_eq!(window.start, datetime!(2026-10-16 12:00 UTC));
        assert_eq!(window.end, now);
    }

    #[test]
    fn unwindowed_query_only_names_device() {
        let query = telemetry_query("hyd-1", None).unwrap();
        assert_eq!(query, vec![("hydrometerId", "hyd-1".to_string())]);
    }

    #[test]
    fn windowed_query_uses_rfc3339_bounds() {
        let window = TimeWindow::lookback(datetime!(2026-10-17 12:00 UTC), 6);
        let query = telemetry_query("hyd-1", Some(window)).unwrap();
        assert_eq!(query[1], ("startDate", "2026-10-17T06:00:00Z".to_string()));
        assert_eq!(query[2], ("endDate", "2026-10-17T12:00:00Z".to_string()));
    }

    #[test]
    fn base_url_keeps_its_path_when_joined() {
        let base = with_trailing_slash(Url::parse("https://example.test/v2").unwrap());
        assert_eq!(
            base.join(DEVICES_PATH).unwrap().as_str(),
            "https://example.test/v2/api/Hydrometers/GetHydrometers"
        );

        let root = with_trailing_slash(Url::parse("https://example.test").unwrap());
        assert_eq!(root.as_str(), "https://example.test/");
    }
}
