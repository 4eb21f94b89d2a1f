use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sumi-Archive
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// URLs admitted to the frontier at depth 0
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Number of concurrent fetch workers
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: u32,

    /// Maximum link depth from the seeds
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "per-host-delay")]
    pub per_host_delay: u64,

    /// Retries allowed after the first attempt for transient failures
    #[serde(rename = "retry-limit")]
    pub retry_limit: u32,

    /// Per-fetch deadline (milliseconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,

    /// Body size ceiling in bytes; larger responses are aborted
    #[serde(rename = "max-body-size")]
    pub max_body_size: u64,

    /// Base of the exponential backoff (milliseconds)
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Cap for any single backoff or Retry-After wait (milliseconds)
    #[serde(rename = "max-backoff", default = "default_max_backoff")]
    pub max_backoff: u64,

    /// How long a cancelled run waits for in-flight jobs (milliseconds)
    #[serde(rename = "grace-period", default = "default_grace_period")]
    pub grace_period: u64,

    /// Redirect hops followed before giving up
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Number of URLs dispatched before the frontier closes
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u64>,
}

fn default_backoff_base() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    30_000
}

fn default_grace_period() -> u64 {
    5_000
}

fn default_max_redirects() -> u32 {
    10
}

impl CrawlerConfig {
    pub fn per_host_delay(&self) -> Duration {
        Duration::from_millis(self.per_host_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            max_concurrency: 8,
            max_depth: 2,
            per_host_delay: 200,
            retry_limit: 3,
            request_timeout: 10_000,
            max_body_size: 5 * 1024 * 1024,
            backoff_base: default_backoff_base(),
            max_backoff: default_max_backoff(),
            grace_period: default_grace_period(),
            max_redirects: default_max_redirects(),
            max_pages: None,
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

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory holding raw response bodies
    #[serde(rename = "raw-html-dir")]
    pub raw_html_dir: String,

    /// Path to the plain-text summary report
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}
