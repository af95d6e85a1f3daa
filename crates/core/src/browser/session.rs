//! Chromium-backed browser session.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::config::PortalConfig;
use crate::error::LookupError;

use super::PoolableSession;

/// One exclusive-use chromium context: a launched browser process plus a
/// single page. Dropping the session tears the process down.
pub struct BrowserSession {
    // Held so the process stays alive for the lifetime of the page.
    _browser: Browser,
    page: Page,
}

impl BrowserSession {
    /// The page this session drives.
    pub fn page(&self) -> &Page {
        &self.page
    }

    fn browser_config(portal: &PortalConfig) -> Result<BrowserConfig, LookupError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");

        if portal.headless {
            builder = builder.arg("--headless=new");
        }

        builder
            .build()
            .map_err(|e| LookupError::Browser(format!("browser config: {}", e)))
    }
}

#[async_trait]
impl PoolableSession for BrowserSession {
    async fn create(portal: &PortalConfig) -> Result<Self, LookupError> {
        debug!("Launching browser session");

        let config = Self::browser_config(portal)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| LookupError::Browser(format!("browser launch: {}", e)))?;

        // Drain CDP events in the background for the lifetime of the process.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| LookupError::Browser(format!("new page: {}", e)))?;

        Ok(Self {
            _browser: browser,
            page,
        })
    }

    async fn healthy(&self, budget: Duration) -> bool {
        // A crashed page or stuck renderer cannot round-trip a trivial
        // evaluation within the budget.
        let check = async {
            self.page
                .evaluate("1 + 1")
                .await
                .ok()
                .and_then(|v| v.into_value::<i64>().ok())
                == Some(2)
        };

        match tokio::time::timeout(budget, check).await {
            Ok(true) => true,
            Ok(false) => {
                warn!("Browser session failed health check");
                false
            }
            Err(_) => {
                warn!("Browser session health check timed out");
                false
            }
        }
    }
}
