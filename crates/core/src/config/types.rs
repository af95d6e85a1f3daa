use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub portal: PortalConfig,
    /// CAPTCHA solving credentials. When absent, challenge pages fail the
    /// lookup instead of being solved.
    #[serde(default)]
    pub captcha: Option<CaptchaConfig>,
    #[serde(default)]
    pub opendata: OpenDataConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("platewatch.db")
}

/// Lookup portal configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
    /// Search page URL.
    #[serde(default = "default_portal_url")]
    pub url: String,
    /// Per-navigation timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    /// Attempts for transient failures (timeouts, connection errors).
    #[serde(default = "default_portal_attempts")]
    pub max_attempts: u32,
    /// Base backoff between attempts in milliseconds (doubles per attempt).
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Run the browser headless (disable for local debugging).
    #[serde(default = "default_true")]
    pub headless: bool,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: default_portal_url(),
            navigation_timeout_secs: default_navigation_timeout(),
            max_attempts: default_portal_attempts(),
            retry_backoff_ms: default_backoff_ms(),
            headless: true,
        }
    }
}

fn default_portal_url() -> String {
    "https://nycserv.nyc.gov/NYCServWeb/PVO_Search.jsp".to_string()
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_portal_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// CAPTCHA solving service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptchaConfig {
    /// Solving service API key.
    pub api_key: String,
    /// Solving service base URL.
    #[serde(default = "default_captcha_url")]
    pub url: String,
    /// Seconds between solution polls.
    #[serde(default = "default_captcha_poll")]
    pub poll_interval_secs: u64,
    /// Maximum number of solution polls per attempt.
    #[serde(default = "default_captcha_max_polls")]
    pub max_polls: u32,
    /// Solve attempts before giving up. Each attempt is a billed call,
    /// so this stays small.
    #[serde(default = "default_captcha_attempts")]
    pub max_attempts: u32,
}

fn default_captcha_url() -> String {
    "http://2captcha.com".to_string()
}

fn default_captcha_poll() -> u64 {
    5
}

fn default_captcha_max_polls() -> u32 {
    24
}

fn default_captcha_attempts() -> u32 {
    2
}

/// Open-data reference API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenDataConfig {
    /// Violations resource URL.
    #[serde(default = "default_opendata_url")]
    pub url: String,
    /// Optional app token for higher rate limits.
    #[serde(default)]
    pub app_token: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_navigation_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenDataConfig {
    fn default() -> Self {
        Self {
            url: default_opendata_url(),
            app_token: None,
            timeout_secs: default_navigation_timeout(),
        }
    }
}

fn default_opendata_url() -> String {
    "https://data.cityofnewyork.us/resource/nc67-uf89.json".to_string()
}

/// Browser session pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Hard ceiling on concurrent browser sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Bounded wait for a free session in seconds.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    /// Health-check round-trip budget in seconds.
    #[serde(default = "default_health_timeout")]
    pub health_check_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            acquire_timeout_secs: default_acquire_timeout(),
            health_check_timeout_secs: default_health_timeout(),
        }
    }
}

fn default_max_sessions() -> usize {
    3
}

fn default_acquire_timeout() -> u64 {
    60
}

fn default_health_timeout() -> u64 {
    3
}

/// Bulk-download job configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// Directory for downloaded ticket images and archives.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Attempts per ticket-image download.
    #[serde(default = "default_portal_attempts")]
    pub max_download_attempts: u32,
    /// Concurrent image downloads within one job.
    #[serde(default = "default_download_concurrency")]
    pub download_concurrency: usize,
    /// Base backoff between download attempts in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Overall job duration budget in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_download_attempts: default_portal_attempts(),
            download_concurrency: default_download_concurrency(),
            retry_backoff_ms: default_backoff_ms(),
            job_timeout_secs: default_job_timeout(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_download_concurrency() -> usize {
    4
}

fn default_job_timeout() -> u64 {
    300
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Seconds before a cached result is considered stale.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    900
}

/// Reconciliation configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ReconcileConfig {
    /// Which source wins when both report a non-blank value for a field.
    #[serde(default)]
    pub prefer: PreferredSource,
}

/// Tie-break precedence between the two violation sources.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreferredSource {
    #[default]
    Scraped,
    Api,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub portal: PortalConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha: Option<SanitizedCaptchaConfig>,
    pub opendata: SanitizedOpenDataConfig,
    pub pool: PoolConfig,
    pub jobs: JobsConfig,
    pub cache: CacheConfig,
    pub reconcile: ReconcileConfig,
}

/// Sanitized CAPTCHA config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCaptchaConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub max_attempts: u32,
}

/// Sanitized open-data config (app token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedOpenDataConfig {
    pub url: String,
    pub app_token_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            portal: config.portal.clone(),
            captcha: config.captcha.as_ref().map(|c| SanitizedCaptchaConfig {
                url: c.url.clone(),
                api_key_configured: !c.api_key.is_empty(),
                max_attempts: c.max_attempts,
            }),
            opendata: SanitizedOpenDataConfig {
                url: config.opendata.url.clone(),
                app_token_configured: config
                    .opendata
                    .app_token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
            },
            pool: config.pool.clone(),
            jobs: config.jobs.clone(),
            cache: config.cache.clone(),
            reconcile: config.reconcile.clone(),
        }
    }
}
