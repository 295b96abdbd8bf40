use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use http::{header, Method, Request};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use crate::error::HostawayError;
use crate::exec::HttpExec;

/// Tokens with this much validity left or less are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub account_id: String,
    pub api_key: String,
}

impl Credentials {
    pub fn new(account_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            api_key: api_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.account_id.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account_id", &self.account_id)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Caches the client-credentials bearer token. Concurrent callers share one exchange.
pub struct TokenCache {
    exec: Arc<dyn HttpExec>,
    endpoint: Url,
    credentials: Credentials,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(exec: Arc<dyn HttpExec>, endpoint: Url, credentials: Credentials) -> Self {
        Self {
            exec,
            endpoint,
            credentials,
            clock: Arc::new(SystemClock),
            cached: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn access_token(&self) -> Result<String, HostawayError> {
        if !self.credentials.is_complete() {
            return Err(HostawayError::Configuration);
        }

        let mut cached = self.cached.lock().await;
        let now = self.clock.now();
        if let Some(token) = cached.as_ref() {
            if token.expires_at > now + Duration::seconds(REFRESH_MARGIN_SECS) {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange().await?;
        let expires_at = Duration::try_seconds(fresh.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| HostawayError::InvalidResponse {
                endpoint: self.endpoint.path().to_string(),
                message: format!("expires_in {} is out of range", fresh.expires_in),
            })?;
        debug!(
            token_type = fresh.token_type.as_deref().unwrap_or("bearer"),
            %expires_at,
            "obtained hostaway access token"
        );
        *cached = Some(CachedToken {
            value: fresh.access_token.clone(),
            expires_at,
        });
        Ok(fresh.access_token)
    }

    /// Drops the cached token so the next call performs a fresh exchange.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn exchange(&self) -> Result<AccessTokenResponse, HostawayError> {
        let form = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", "client_credentials")
            .append_pair("client_id", &self.credentials.account_id)
            .append_pair("client_secret", &self.credentials.api_key)
            .append_pair("scope", "general")
            .finish();

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.as_str())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(form.into_bytes())?;

        let response = self.exec.execute(request).await?;
        let status = response.status();
        let body = response.into_body();
        if !status.is_success() {
            return Err(HostawayError::Authentication {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|err| HostawayError::InvalidResponse {
            endpoint: self.endpoint.path().to_string(),
            message: err.to_string(),
        })
    }
}
