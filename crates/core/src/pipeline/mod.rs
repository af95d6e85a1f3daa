//! End-to-end lookup: portal scrape + reference fetch, reconciled and cached.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::error::LookupError;
use crate::reconcile::Reconciler;
use crate::violation::{EnhancedResult, Query, ResultMetadata, Violation};

/// A backend that can produce violations for a query.
///
/// Implemented by the portal scraper and the open-data client; mocks stand
/// in for both in tests.
#[async_trait]
pub trait ViolationSource: Send + Sync {
    /// Stable source name, recorded in result metadata.
    fn name(&self) -> &'static str;

    /// Fetch violations for the query.
    async fn fetch(&self, query: &Query) -> Result<Vec<Violation>, LookupError>;
}

/// The retrieval pipeline: queries both sources, reconciles, caches.
pub struct LookupPipeline {
    portal: Arc<dyn ViolationSource>,
    reference: Arc<dyn ViolationSource>,
    reconciler: Reconciler,
    cache: Arc<dyn ResultCache>,
}

impl LookupPipeline {
    pub fn new(
        portal: Arc<dyn ViolationSource>,
        reference: Arc<dyn ViolationSource>,
        reconciler: Reconciler,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        Self {
            portal,
            reference,
            reconciler,
            cache,
        }
    }

    /// Produce the canonical result for a query, from cache when fresh.
    ///
    /// The portal is the primary source: its failure fails the search. The
    /// reference API enriches the result and degrades gracefully, since a
    /// scrape-only answer is still a correct (if less complete) answer.
    pub async fn search(&self, query: &Query) -> Result<EnhancedResult, LookupError> {
        match self.cache.get(query) {
            Ok(Some(result)) => {
                debug!(query = %query, "Serving result from cache");
                return Ok(result);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Result cache read failed"),
        }

        let started = Instant::now();

        let (scraped, reference) =
            tokio::join!(self.portal.fetch(query), self.reference.fetch(query));

        let scraped = scraped?;
        let mut data_sources = vec![self.portal.name().to_string()];

        let api = match reference {
            Ok(violations) => {
                data_sources.push(self.reference.name().to_string());
                violations
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Reference source failed, continuing with portal data only");
                Vec::new()
            }
        };

        let violations = self.reconciler.merge(scraped, api);
        let completeness = Reconciler::completeness(&violations);

        let result = EnhancedResult {
            query: query.clone(),
            violations,
            metadata: ResultMetadata {
                completeness,
                processing_time_secs: started.elapsed().as_secs_f64(),
                data_sources,
                downloaded_images: 0,
            },
            fetched_at: Utc::now(),
        };

        if let Err(e) = self.cache.put(&result) {
            warn!(error = %e, "Result cache write failed");
        }

        info!(
            query = %query,
            violations = result.violations.len(),
            completeness = result.metadata.completeness,
            "Lookup complete"
        );

        Ok(result)
    }

    /// Record the bulk-download image count on the cached result, so later
    /// cache hits report it.
    pub fn record_downloaded_images(&self, query: &Query, downloaded: u32) {
        match self.cache.get(query) {
            Ok(Some(mut result)) => {
                result.metadata.downloaded_images = downloaded;
                if let Err(e) = self.cache.put(&result) {
                    warn!(error = %e, "Failed to update cached image count");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Result cache read failed"),
        }
    }
}
