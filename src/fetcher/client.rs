//! HTTP adapter for Steam Community pages
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - Fetching a profile page and its friends page
//! - Resolving vanity names
//! - Mapping HTTP and network failures onto `FetchError`

use crate::config::{Config, UserAgentConfig};
use crate::fetcher::parser::{extract_friend_ids, find_profile_id, parse_profile_page};
use crate::fetcher::{FetchError, NodeFetcher, NodeRecord};
use crate::node::{profile_url, NodeId};
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Whole-request timeout
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use steam_ripple::config::UserAgentConfig;
/// use steam_ripple::fetcher::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SteamRipple".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(5))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches profiles over HTTP
///
/// One `fetch` issues two requests: the profile page, then the friends page.
#[derive(Debug, Clone)]
pub struct SteamFetcher {
    client: Client,
    base_url: String,
    max_friends: usize,
}

impl SteamFetcher {
    /// Creates a fetcher around an existing client
    pub fn new(client: Client, base_url: impl Into<String>, max_friends: usize) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_friends,
        }
    }

    /// Creates a fetcher from the crawl configuration
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config.user_agent, config.source.request_timeout())?;
        Ok(Self::new(
            client,
            config.source.base_url.clone(),
            config.crawler.max_friends_per_profile,
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issues a GET and returns the body of a 2xx response
    async fn get_body(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_request_error)?;

        check_status(response.status())?;

        response.text().await.map_err(classify_request_error)
    }

    /// Reads the friend list; only throttling is surfaced as an error
    async fn fetch_friends(&self, id: NodeId, page_url: &str) -> Result<Vec<NodeId>, FetchError> {
        let friends_url = format!("{}/friends/", page_url);
        match self.get_body(&friends_url).await {
            Ok(body) => {
                let friends = extract_friend_ids(&body, id, self.max_friends);
                tracing::debug!("Found {} friends for {}", friends.len(), id);
                Ok(friends)
            }
            Err(FetchError::RateLimited) => Err(FetchError::RateLimited),
            Err(e) => {
                tracing::debug!("Friends page unavailable for {}: {}", id, e);
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl NodeFetcher for SteamFetcher {
    async fn fetch(&self, id: NodeId) -> Result<NodeRecord, FetchError> {
        let page_url = profile_url(&self.base_url, id);

        let body = self.get_body(&page_url).await?;
        let parsed = parse_profile_page(&body, chrono::Utc::now().date_naive())?;

        let friends = self.fetch_friends(id, &page_url).await?;

        let mut record = NodeRecord::new(id, page_url);
        record.level = parsed.level;
        record.avatar_url = parsed.avatar_url;
        record.ban = parsed.ban;
        record.neighbors = friends.into_iter().collect();

        Ok(record)
    }

    async fn resolve_alias(&self, alias: &str) -> Result<NodeId, FetchError> {
        let url = format!("{}/id/{}", self.base_url, alias);
        let body = self.get_body(&url).await?;
        find_profile_id(&body).ok_or(FetchError::NotFound)
    }
}

/// Maps an HTTP status onto the fetch taxonomy
///
/// | Status | Outcome |
/// |--------|---------|
/// | 2xx | Ok |
/// | 404 | NotFound |
/// | 429 | RateLimited |
/// | 5xx | Transient |
/// | other | Malformed |
fn check_status(status: StatusCode) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND => Err(FetchError::NotFound),
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
        s if s.is_server_error() => Err(FetchError::Transient(format!("HTTP {}", s.as_u16()))),
        s => Err(FetchError::Malformed(format!(
            "Unexpected HTTP {}",
            s.as_u16()
        ))),
    }
}

fn classify_request_error(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Transient("Request timeout".to_string())
    } else if e.is_connect() {
        FetchError::Transient("Connection failed".to_string())
    } else if e.is_redirect() {
        FetchError::Malformed(format!("Redirect error: {}", e))
    } else {
        FetchError::Transient(e.to_string())
    }
}
