use crate::crawler::{
    CoordinatorSettings, DetailLayout, EnrichmentPolicy, ListingLayout, PaginationPolicy,
};
use crate::engine::chrome::ChromeOptions;
use crate::engine::Locator;
use crate::flow::RetryPolicy;
use crate::session::SessionSettings;
use crate::url::DetailUrlTemplate;
use crate::UrlResult;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Stellwerk
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub layout: LayoutConfig,
    pub output: OutputConfig,
}

/// What to crawl and how wide to fan out
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlConfig {
    /// Listing URL; may be left out when a runtime input supplies it
    #[serde(rename = "search-url", default)]
    pub search_url: String,

    /// Number of enrichment sessions
    #[serde(rename = "parallel-company-crawlers", default = "default_parallel_company_crawlers")]
    pub parallel_company_crawlers: usize,

    /// Detail page URL with an `{id}` placeholder
    #[serde(rename = "detail-url-template")]
    pub detail_url_template: String,

    /// Clean up every session after this many listing rows
    #[serde(rename = "cleanup-every-rows", default = "default_cleanup_every_rows")]
    pub cleanup_every_rows: usize,

    /// Clean up an enrichment session after this many detail pages
    #[serde(rename = "detail-cleanup-every", default = "default_detail_cleanup_every")]
    pub detail_cleanup_every: usize,

    /// Idle time before sessions are closed at the end of a crawl (milliseconds)
    #[serde(rename = "close-grace-ms", default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
}

fn default_parallel_company_crawlers() -> usize {
    3
}

fn default_cleanup_every_rows() -> usize {
    50
}

fn default_detail_cleanup_every() -> usize {
    10
}

fn default_close_grace_ms() -> u64 {
    2000
}

/// Which rendering engine drives the sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Chrome,
    Static,
}

/// Rendering engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub engine: EngineKind,

    pub headless: bool,

    /// Browser binary; found on the PATH when unset
    pub executable: Option<PathBuf>,

    /// Unpacked extension directories loaded into every browser
    pub extensions: Vec<PathBuf>,

    /// Extra command-line switches
    pub args: Vec<String>,

    #[serde(rename = "viewport-width")]
    pub viewport_width: u32,

    #[serde(rename = "viewport-height")]
    pub viewport_height: u32,

    /// Upper bound for one navigation attempt (milliseconds)
    #[serde(rename = "navigation-timeout-ms")]
    pub navigation_timeout_ms: u64,

    /// Upper bound for waiting on network quiescence (milliseconds)
    #[serde(rename = "network-idle-timeout-ms")]
    pub network_idle_timeout_ms: u64,

    /// User agent of the static engine
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Chrome,
            headless: true,
            executable: None,
            extensions: Vec::new(),
            args: Vec::new(),
            viewport_width: 1366,
            viewport_height: 768,
            navigation_timeout_ms: 30_000,
            network_idle_timeout_ms: 10_000,
            user_agent: format!("stellwerk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            headless: self.headless,
            executable: self.executable.clone(),
            extensions: self.extensions.clone(),
            args: self.args.clone(),
            viewport_width: self.viewport_width,
            viewport_height: self.viewport_height,
            request_timeout: self.navigation_timeout(),
        }
    }
}

/// Retry budgets and backoff bases
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "navigation-backoff-ms")]
    pub navigation_backoff_ms: u64,

    #[serde(rename = "primary-navigation-retries")]
    pub primary_navigation_retries: u32,

    #[serde(rename = "warm-up-retries")]
    pub warm_up_retries: u32,

    #[serde(rename = "in-app-retries")]
    pub in_app_retries: u32,

    #[serde(rename = "full-load-retries")]
    pub full_load_retries: u32,

    #[serde(rename = "detail-attempts")]
    pub detail_attempts: u32,

    #[serde(rename = "detail-backoff-ms")]
    pub detail_backoff_ms: u64,

    #[serde(rename = "pagination-attempts")]
    pub pagination_attempts: u32,

    #[serde(rename = "pagination-backoff-ms")]
    pub pagination_backoff_ms: u64,

    /// How long to wait for new rows after each load-more click (milliseconds)
    #[serde(rename = "pagination-wait-ms")]
    pub pagination_wait_ms: u64,

    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            navigation_backoff_ms: 1000,
            primary_navigation_retries: 5,
            warm_up_retries: 5,
            in_app_retries: 2,
            full_load_retries: 4,
            detail_attempts: 2,
            detail_backoff_ms: 2000,
            pagination_attempts: 5,
            pagination_backoff_ms: 5000,
            pagination_wait_ms: 10_000,
            poll_interval_ms: 250,
        }
    }
}

/// Where fields live on listing and detail pages
///
/// Listing entries are element id templates containing `{index}`; detail
/// entries and `load-more` are CSS selectors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    #[serde(rename = "company-name")]
    pub company_name: String,

    #[serde(rename = "job-title")]
    pub job_title: String,

    pub location: String,

    #[serde(rename = "start-date")]
    pub start_date: String,

    #[serde(rename = "post-date")]
    pub post_date: String,

    #[serde(rename = "detail-link")]
    pub detail_link: String,

    /// Levels between the company-name element and its row container
    #[serde(rename = "row-container-depth")]
    pub row_container_depth: usize,

    #[serde(rename = "load-more")]
    pub load_more: String,

    pub address: String,

    pub description: String,

    pub website: String,

    #[serde(rename = "company-size")]
    pub company_size: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        let listing = ListingLayout::default();
        let detail = DetailLayout::default();
        Self {
            company_name: listing.company_name,
            job_title: listing.job_title,
            location: listing.location,
            start_date: listing.start_date,
            post_date: listing.post_date,
            detail_link: listing.detail_link,
            row_container_depth: listing.row_container_depth,
            load_more: listing.load_more.as_css().to_string(),
            address: detail.address.as_css().to_string(),
            description: detail.description.as_css().to_string(),
            website: detail.website.as_css().to_string(),
            company_size: detail.company_size.as_css().to_string(),
        }
    }
}

impl LayoutConfig {
    /// The listing id templates, by key, for validation and logging
    pub fn listing_templates(&self) -> [(&'static str, &str); 6] {
        [
            ("company-name", &self.company_name),
            ("job-title", &self.job_title),
            ("location", &self.location),
            ("start-date", &self.start_date),
            ("post-date", &self.post_date),
            ("detail-link", &self.detail_link),
        ]
    }

    /// The CSS selectors, by key
    pub fn selectors(&self) -> [(&'static str, &str); 5] {
        [
            ("load-more", &self.load_more),
            ("address", &self.address),
            ("description", &self.description),
            ("website", &self.website),
            ("company-size", &self.company_size),
        ]
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Optional JSON lines file every batch is appended to
    #[serde(rename = "jsonl-path", default)]
    pub jsonl_path: Option<String>,
}

impl Config {
    pub fn detail_template(&self) -> UrlResult<DetailUrlTemplate> {
        DetailUrlTemplate::new(&self.crawl.detail_url_template)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            navigation_timeout: self.browser.navigation_timeout(),
            idle_timeout: Duration::from_millis(self.browser.network_idle_timeout_ms),
            backoff_base: Duration::from_millis(self.retry.navigation_backoff_ms),
            poll_interval: Duration::from_millis(self.retry.poll_interval_ms),
        }
    }

    pub fn listing_layout(&self) -> ListingLayout {
        let layout = &self.layout;
        ListingLayout {
            company_name: layout.company_name.clone(),
            job_title: layout.job_title.clone(),
            location: layout.location.clone(),
            start_date: layout.start_date.clone(),
            post_date: layout.post_date.clone(),
            detail_link: layout.detail_link.clone(),
            row_container_depth: layout.row_container_depth,
            load_more: Locator::css(&layout.load_more),
        }
    }

    pub fn detail_layout(&self) -> DetailLayout {
        DetailLayout {
            address: Locator::css(&self.layout.address),
            description: Locator::css(&self.layout.description),
            website: Locator::css(&self.layout.website),
            company_size: Locator::css(&self.layout.company_size),
        }
    }

    pub fn pagination_policy(&self) -> PaginationPolicy {
        PaginationPolicy {
            retry: RetryPolicy::new(
                self.retry.pagination_attempts,
                Duration::from_millis(self.retry.pagination_backoff_ms),
            ),
            wait_timeout: Duration::from_millis(self.retry.pagination_wait_ms),
            poll_interval: Duration::from_millis(self.retry.poll_interval_ms),
        }
    }

    pub fn enrichment_policy(&self) -> EnrichmentPolicy {
        EnrichmentPolicy {
            in_app_retries: self.retry.in_app_retries,
            full_load_retries: self.retry.full_load_retries,
            detail: RetryPolicy::new(
                self.retry.detail_attempts,
                Duration::from_millis(self.retry.detail_backoff_ms),
            ),
            warm_up_retries: self.retry.warm_up_retries,
            cleanup_every: self.crawl.detail_cleanup_every,
        }
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            primary_retries: self.retry.primary_navigation_retries,
            cleanup_every: self.crawl.cleanup_every_rows,
            close_grace: Duration::from_millis(self.crawl.close_grace_ms),
        }
    }
}
