use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use platewatch_core::{
    load_config, validate_config, BrowserPool, CaptchaSolver, HttpImageFetcher, ImageFetcher,
    JobManager, JobStore, LookupPipeline, OpenDataClient, PortalScraper, Reconciler, ResultCache,
    ScrapingPortal, SqliteJobStore, SqliteResultCache, TwoCaptchaClient, ViolationSource,
};

use platewatch_server::api::create_router;
use platewatch_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("PLATEWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Portal URL: {}", config.portal.url);

    // Log a short config hash so deploys are distinguishable in logs
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Config hash: {}", &config_hash[..16]);

    // Create SQLite job store
    let job_store: Arc<dyn JobStore> = Arc::new(
        SqliteJobStore::new(&config.database.path).context("Failed to create job store")?,
    );
    info!("Job store initialized");

    // Create result cache with the configured TTL
    let cache: Arc<dyn ResultCache> = Arc::new(
        SqliteResultCache::new(
            &config.database.path,
            Duration::from_secs(config.cache.ttl_secs),
        )
        .context("Failed to create result cache")?,
    );
    info!("Result cache initialized (ttl: {}s)", config.cache.ttl_secs);

    // Create CAPTCHA solver if credentials are configured
    let solver: Option<Arc<dyn CaptchaSolver>> = match &config.captcha {
        Some(captcha_config) => {
            info!("CAPTCHA solver configured ({})", captcha_config.url);
            Some(Arc::new(TwoCaptchaClient::new(captcha_config.clone())))
        }
        None => {
            info!("No CAPTCHA solver configured; challenge pages will fail lookups");
            None
        }
    };

    // Create the browser session pool and portal scraper
    let pool = Arc::new(BrowserPool::new(
        config.pool.clone(),
        config.portal.clone(),
    ));
    info!(
        "Browser session pool initialized (ceiling: {})",
        config.pool.max_sessions
    );

    let scraper = PortalScraper::new(config.portal.clone(), solver);
    let portal: Arc<dyn ViolationSource> = Arc::new(ScrapingPortal::new(Arc::clone(&pool), scraper));

    // Create the open-data reference client
    let reference: Arc<dyn ViolationSource> =
        Arc::new(OpenDataClient::new(config.opendata.clone()));
    info!("Open-data client initialized ({})", config.opendata.url);

    // Assemble the lookup pipeline
    let pipeline = Arc::new(LookupPipeline::new(
        portal,
        reference,
        Reconciler::new(config.reconcile.clone()),
        cache,
    ));

    // Create the job manager and fail-closed any jobs interrupted by a
    // previous shutdown
    let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpImageFetcher::default());
    let jobs = Arc::new(JobManager::new(
        job_store,
        Arc::clone(&pipeline),
        fetcher,
        config.jobs.clone(),
    ));
    let recovered = jobs
        .recover_interrupted()
        .context("Failed to recover interrupted jobs")?;
    if recovered > 0 {
        info!("Recovered {} interrupted jobs", recovered);
    }
    info!("Job manager initialized");

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&pipeline),
        Arc::clone(&jobs),
    ));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Abort in-flight job tasks; they fail closed on the next startup.
    info!("Server shutting down...");
    jobs.shutdown().await;
    info!("Job manager stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
