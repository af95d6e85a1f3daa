//! Ticket-image fetching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::LookupError;

/// Trait for fetching scanned ticket images by URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetch the image bytes.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LookupError>;
}

/// Plain HTTP image fetcher.
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, LookupError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::SiteUnavailable(format!("image download timed out: {}", url))
            } else {
                LookupError::SiteUnavailable(format!("image download failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(LookupError::SiteUnavailable(format!(
                "image download HTTP {}: {}",
                response.status(),
                url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LookupError::SiteUnavailable(format!("image body: {}", e)))?;

        Ok(bytes.to_vec())
    }
}
