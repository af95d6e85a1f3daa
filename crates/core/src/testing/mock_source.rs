//! Mock violation source for testing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::LookupError;
use crate::pipeline::ViolationSource;
use crate::violation::{Query, Violation};

/// Mock implementation of [`ViolationSource`].
///
/// Provides controllable behavior for testing:
/// - Return configurable violation lists
/// - Track queries for assertions
/// - Simulate failures and slow lookups
///
/// # Example
///
/// ```rust,ignore
/// use platewatch_core::testing::{fixtures, MockSource};
///
/// let portal = MockSource::portal();
/// portal.set_violations(vec![fixtures::outstanding("8001234567", 65.0)]).await;
///
/// let result = portal.fetch(&fixtures::query("XYZ9999")).await?;
/// assert_eq!(result.len(), 1);
/// assert_eq!(portal.recorded_queries().await.len(), 1);
/// ```
pub struct MockSource {
    name: &'static str,
    violations: Arc<RwLock<Vec<Violation>>>,
    error: Arc<RwLock<Option<LookupError>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    queries: Arc<RwLock<Vec<Query>>>,
}

impl MockSource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            violations: Arc::new(RwLock::new(Vec::new())),
            error: Arc::new(RwLock::new(None)),
            delay: Arc::new(RwLock::new(None)),
            queries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A mock standing in for the portal scraper.
    pub fn portal() -> Self {
        Self::new("portal")
    }

    /// A mock standing in for the open-data client.
    pub fn open_data() -> Self {
        Self::new("open_data")
    }

    /// Configure the violations every fetch returns.
    pub async fn set_violations(&self, violations: Vec<Violation>) {
        *self.violations.write().await = violations;
    }

    /// Make every fetch fail with this error.
    pub async fn set_error(&self, error: LookupError) {
        *self.error.write().await = Some(error);
    }

    /// Clear a configured error.
    pub async fn clear_error(&self) {
        *self.error.write().await = None;
    }

    /// Delay every fetch, to simulate a slow upstream.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Queries recorded so far.
    pub async fn recorded_queries(&self) -> Vec<Query> {
        self.queries.read().await.clone()
    }

    /// Number of fetches made.
    pub async fn fetch_count(&self) -> usize {
        self.queries.read().await.len()
    }
}

#[async_trait]
impl ViolationSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Violation>, LookupError> {
        self.queries.write().await.push(query.clone());

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.error.read().await.clone() {
            return Err(error);
        }

        Ok(self.violations.read().await.clone())
    }
}
