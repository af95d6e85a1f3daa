//! Core library for the parking-violation lookup and fulfillment service.
//!
//! The pipeline scrapes a challenge-protected municipal portal with a
//! bounded pool of headless browser sessions, reconciles the scraped records
//! against the official open-data API, and fulfills summary reports and bulk
//! ticket-image download jobs.

pub mod browser;
pub mod cache;
pub mod captcha;
pub mod config;
pub mod error;
pub mod job;
pub mod open_data;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod scraper;
pub mod testing;
pub mod violation;

pub use browser::{BrowserPool, BrowserSession, SessionHandle, SessionPool};
pub use cache::{CacheError, ResultCache, SqliteResultCache};
pub use captcha::{CaptchaSolver, Challenge, TwoCaptchaClient};
pub use config::{
    load_config, load_config_from_str, validate_config, CaptchaConfig, Config, ConfigError,
    JobsConfig, OpenDataConfig, PoolConfig, PortalConfig, PreferredSource, ReconcileConfig,
    SanitizedConfig, ServerConfig,
};
pub use error::{ErrorKind, LookupError};
pub use job::{
    DownloadOutcome, HttpImageFetcher, ImageFetcher, Job, JobError, JobManager, JobState,
    JobStore, SqliteJobStore,
};
pub use open_data::OpenDataClient;
pub use pipeline::{LookupPipeline, ViolationSource};
pub use reconcile::Reconciler;
pub use report::render_report;
pub use scraper::{PortalScraper, ScrapingPortal};
pub use violation::{
    EnhancedResult, Origin, Query, ResultMetadata, Violation, ViolationStatus, ViolationSummary,
};
