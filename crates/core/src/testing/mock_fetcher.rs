//! Mock ticket-image fetcher for testing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::LookupError;
use crate::job::ImageFetcher;

/// Mock implementation of [`ImageFetcher`].
///
/// URLs must be registered with [`MockImageFetcher::insert`]; unknown URLs
/// fail. A URL can also be configured to fail a number of times before
/// succeeding, to exercise the per-item retry path.
#[derive(Default)]
pub struct MockImageFetcher {
    images: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// Remaining transient failures per URL.
    failures: Arc<RwLock<HashMap<String, u32>>>,
    fetches: Arc<RwLock<Vec<String>>>,
    delay: Arc<RwLock<Option<std::time::Duration>>>,
}

impl MockImageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register image bytes for a URL.
    pub async fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.images.write().await.insert(url.into(), bytes);
    }

    /// Make the next `count` fetches of this URL fail with a transient
    /// error before any registered bytes are served.
    pub async fn fail_times(&self, url: impl Into<String>, count: u32) {
        self.failures.write().await.insert(url.into(), count);
    }

    /// Delay every fetch, to keep a job observably in flight.
    pub async fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// URLs fetched so far, in call order.
    pub async fn recorded_fetches(&self) -> Vec<String> {
        self.fetches.read().await.clone()
    }

    /// Number of fetch calls for one URL.
    pub async fn fetch_count(&self, url: &str) -> usize {
        self.fetches
            .read()
            .await
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }
}

#[async_trait]
impl ImageFetcher for MockImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LookupError> {
        self.fetches.write().await.push(url.to_string());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.write().await;
            if let Some(remaining) = failures.get_mut(url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(LookupError::SiteUnavailable(format!(
                        "simulated failure: {}",
                        url
                    )));
                }
            }
        }

        self.images
            .read()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| LookupError::SiteUnavailable(format!("no such image: {}", url)))
    }
}
