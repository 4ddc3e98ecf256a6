use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Steam-Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Raw seed identifiers (ids, profile locators, or aliases)
    #[serde(default)]
    pub seeds: Vec<String>,

    pub crawler: CrawlerConfig,

    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,

    #[serde(default)]
    pub source: SourceConfig,

    pub output: OutputConfig,
}

/// Worker pool and pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent crawl workers
    pub workers: u32,

    /// How long a worker sleeps when the frontier is empty (milliseconds)
    #[serde(rename = "idle-wait-ms")]
    pub idle_wait_ms: u64,

    /// Lower bound of the randomized delay after each success (milliseconds)
    #[serde(rename = "pacing-min-ms")]
    pub pacing_min_ms: u64,

    /// Upper bound of the randomized delay after each success (milliseconds)
    #[serde(rename = "pacing-max-ms")]
    pub pacing_max_ms: u64,

    /// Pause after the remote source signals throttling (seconds)
    #[serde(rename = "cooldown-secs")]
    pub cooldown_secs: u64,

    /// Immediate retries for transient fetch failures
    #[serde(rename = "transient-retries", default = "default_transient_retries")]
    pub transient_retries: u32,

    /// Cap on neighbors taken from one friends page
    #[serde(
        rename = "max-friends-per-profile",
        default = "default_max_friends_per_profile"
    )]
    pub max_friends_per_profile: usize,

    /// Stop a worker once the frontier has been empty this long (milliseconds)
    #[serde(rename = "empty-queue-timeout-ms", default)]
    pub empty_queue_timeout_ms: Option<u64>,

    /// Upper bound on joining workers during shutdown (seconds)
    #[serde(
        rename = "shutdown-timeout-secs",
        default = "default_shutdown_timeout_secs"
    )]
    pub shutdown_timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn empty_queue_timeout(&self) -> Option<Duration> {
        self.empty_queue_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            idle_wait_ms: 10_000,
            pacing_min_ms: 2_000,
            pacing_max_ms: 5_000,
            cooldown_secs: 60,
            transient_retries: default_transient_retries(),
            max_friends_per_profile: default_max_friends_per_profile(),
            empty_queue_timeout_ms: None,
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Remote source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Community site root
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(
        rename = "request-timeout-secs",
        default = "default_request_timeout_secs"
    )]
    pub request_timeout_secs: u64,
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_transient_retries() -> u32 {
    1
}

fn default_max_friends_per_profile() -> usize {
    100
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_base_url() -> String {
    "https://steamcommunity.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}
