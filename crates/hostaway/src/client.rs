use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::config::HostawayConfig;
use http::{header, Method, Request, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::HostawayError;
use crate::exec::{HttpExec, ReqwestExecutor};
use crate::token::{Clock, Credentials, TokenCache};

pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// One page of the reviews listing, as returned by the provider. Records stay raw
/// JSON so a single ill-shaped record cannot reject the whole page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewsPage {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub result: Vec<Value>,
    #[serde(default, alias = "count")]
    pub total_count: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Paged source of remote review records.
#[async_trait]
pub trait ReviewFeed: Send + Sync {
    async fn fetch_reviews(&self, limit: u32, offset: u32) -> Result<ReviewsPage, HostawayError>;

    fn page_size(&self) -> u32 {
        DEFAULT_PAGE_SIZE
    }

    /// Upper bound on pages walked by [`ReviewFeed::fetch_all_reviews`]; `None` walks
    /// until a short page.
    fn max_pages(&self) -> Option<u32> {
        None
    }

    async fn fetch_all_reviews(&self) -> Result<Vec<Value>, HostawayError> {
        let page_size = self.page_size().max(1);
        let mut offset = 0u32;
        let mut pages = 0u32;
        let mut records = Vec::new();

        loop {
            let page = self.fetch_reviews(page_size, offset).await?;
            let received = page.result.len();
            records.extend(page.result);
            pages += 1;
            debug!(offset, received, "fetched review page");

            if received < page_size as usize {
                break;
            }
            if let Some(max_pages) = self.max_pages() {
                if pages >= max_pages {
                    warn!(
                        pages,
                        fetched = records.len(),
                        "review pagination stopped at page cap; upstream kept returning full pages"
                    );
                    break;
                }
            }
            offset = offset.saturating_add(page_size);
        }

        info!(pages, fetched = records.len(), "fetched all reviews");
        Ok(records)
    }
}

pub struct HostawayClient {
    exec: Arc<dyn HttpExec>,
    tokens: TokenCache,
    base: Url,
    page_size: u32,
    max_pages: Option<u32>,
}

impl HostawayClient {
    pub fn new(
        exec: Arc<dyn HttpExec>,
        base_url: &str,
        credentials: Credentials,
    ) -> Result<Self, HostawayError> {
        let base = parse_base_url(base_url)?;
        let token_endpoint = join(&base, "accessTokens")?;
        let tokens = TokenCache::new(exec.clone(), token_endpoint, credentials);
        Ok(Self {
            exec,
            tokens,
            base,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: None,
        })
    }

    /// Builds a client from configuration, or `None` when credentials are absent.
    pub fn from_config(config: &HostawayConfig) -> Result<Option<Self>, HostawayError> {
        if !config.is_configured() {
            return Ok(None);
        }
        let credentials = Credentials::new(
            config.account_id.clone().unwrap_or_default(),
            config.api_key.clone().unwrap_or_default(),
        );
        let exec = Arc::new(ReqwestExecutor::new(Duration::from_secs(
            config.timeout_secs,
        ))?);
        let client = Self::new(exec, &config.base_url, credentials)?
            .with_paging(config.page_size, config.max_pages);
        Ok(Some(client))
    }

    pub fn with_paging(mut self, page_size: u32, max_pages: Option<u32>) -> Self {
        self.page_size = page_size.max(1);
        self.max_pages = max_pages;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.tokens = self.tokens.with_clock(clock);
        self
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }
}

#[async_trait]
impl ReviewFeed for HostawayClient {
    #[instrument(skip(self))]
    async fn fetch_reviews(&self, limit: u32, offset: u32) -> Result<ReviewsPage, HostawayError> {
        let token = self.tokens.access_token().await?;

        let mut url = join(&self.base, "reviews")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());

        let request = Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Vec::new())?;

        let response = self.exec.execute(request).await?;
        let status = response.status();
        let body = response.into_body();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.tokens.invalidate().await;
            }
            return Err(HostawayError::Upstream {
                endpoint: url.path().to_string(),
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        serde_json::from_slice(&body).map_err(|err| HostawayError::InvalidResponse {
            endpoint: url.path().to_string(),
            message: err.to_string(),
        })
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }
}

fn parse_base_url(raw: &str) -> Result<Url, HostawayError> {
    let trimmed = raw.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|err| HostawayError::InvalidBaseUrl {
        url: raw.to_string(),
        message: err.to_string(),
    })
}

fn join(base: &Url, path: &str) -> Result<Url, HostawayError> {
    base.join(path).map_err(|err| HostawayError::InvalidBaseUrl {
        url: base.to_string(),
        message: err.to_string(),
    })
}
