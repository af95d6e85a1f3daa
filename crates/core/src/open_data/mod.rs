//! Open-data reference API client.
//!
//! The official open-data portal exposes the violations dataset as a JSON
//! resource queryable by plate and state. Records here are authoritative for
//! financial fields but lack the scanned ticket details the portal page has,
//! which is why results are reconciled rather than used directly.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::OpenDataConfig;
use crate::error::LookupError;
use crate::pipeline::ViolationSource;
use crate::violation::{infer_status, parse_amount, Origin, Query, Violation};

/// Client for the open-data violations resource.
pub struct OpenDataClient {
    client: Client,
    config: OpenDataConfig,
}

impl OpenDataClient {
    /// Create a new client with the given configuration.
    pub fn new(config: OpenDataConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, config }
    }

    /// Build the resource URL for a query.
    fn build_url(&self, query: &Query) -> String {
        let mut url = format!(
            "{}?plate={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&query.license_plate)
        );

        // NY is the dataset default; only other states need the filter.
        if query.state != "NY" {
            url.push_str(&format!("&state={}", urlencoding::encode(&query.state)));
        }

        if let Some(token) = &self.config.app_token {
            url.push_str(&format!("&$$app_token={}", urlencoding::encode(token)));
        }

        url
    }

    async fn fetch_once(&self, query: &Query) -> Result<Vec<Violation>, LookupError> {
        let url = self.build_url(query);
        debug!(query = %query, "Fetching open-data records");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::SiteUnavailable("open-data request timed out".to_string())
            } else {
                LookupError::SiteUnavailable(format!("open-data request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::SiteUnavailable(format!(
                "open-data HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let records: Vec<OpenDataRecord> = response
            .json()
            .await
            .map_err(|e| LookupError::ParseError(format!("open-data response: {}", e)))?;

        let violations: Vec<Violation> = records
            .into_iter()
            .filter_map(|r| r.into_violation())
            .collect();

        debug!(
            query = %query,
            records = violations.len(),
            "Open-data fetch complete"
        );

        Ok(violations)
    }
}

#[async_trait]
impl ViolationSource for OpenDataClient {
    fn name(&self) -> &'static str {
        "open_data"
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Violation>, LookupError> {
        // One bounded retry on transport faults; parse failures surface
        // immediately.
        match self.fetch_once(query).await {
            Ok(violations) => Ok(violations),
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Open-data fetch failed, retrying once");
                self.fetch_once(query).await
            }
            Err(e) => Err(e),
        }
    }
}

/// One record of the open-data violations resource. All fields arrive as
/// strings; amounts are parsed leniently.
#[derive(Debug, Deserialize)]
struct OpenDataRecord {
    #[serde(default)]
    summons_number: Option<String>,
    /// The dataset's `violation` column holds the description text.
    #[serde(default)]
    violation: Option<String>,
    #[serde(default)]
    issue_date: Option<String>,
    #[serde(default)]
    fine_amount: Option<String>,
    #[serde(default)]
    penalty_amount: Option<String>,
    #[serde(default)]
    interest_amount: Option<String>,
    #[serde(default)]
    reduction_amount: Option<String>,
    #[serde(default)]
    payment_amount: Option<String>,
    #[serde(default)]
    amount_due: Option<String>,
    #[serde(default)]
    county: Option<String>,
    #[serde(default)]
    precinct: Option<String>,
    #[serde(default)]
    issuing_agency: Option<String>,
    #[serde(default)]
    summons_image: Option<SummonsImage>,
}

#[derive(Debug, Deserialize)]
struct SummonsImage {
    #[serde(default)]
    url: Option<String>,
}

impl OpenDataRecord {
    /// Convert to the canonical violation shape. Records without a summons
    /// number cannot be reconciled and are dropped.
    fn into_violation(self) -> Option<Violation> {
        let summons_number = self.summons_number.filter(|s| !s.is_empty())?;

        let amount_due = self.amount_due.as_deref().and_then(parse_amount);
        let payment_amount = self.payment_amount.as_deref().and_then(parse_amount);

        let violation = Violation {
            summons_number,
            issue_date: self.issue_date.filter(|s| !s.is_empty()),
            violation_code: None,
            description: self.violation.filter(|s| !s.is_empty()),
            location: self
                .county
                .filter(|s| !s.is_empty())
                .or(self.precinct.filter(|s| !s.is_empty())),
            agency: self.issuing_agency.filter(|s| !s.is_empty()),
            fine_amount: self.fine_amount.as_deref().and_then(parse_amount),
            penalty_amount: self.penalty_amount.as_deref().and_then(parse_amount),
            interest_amount: self.interest_amount.as_deref().and_then(parse_amount),
            reduction_amount: self.reduction_amount.as_deref().and_then(parse_amount),
            payment_amount,
            amount_due,
            status: infer_status(amount_due, payment_amount),
            ticket_image_url: self.summons_image.and_then(|i| i.url),
            origin: Origin::Api,
        };

        Some(violation.normalized())
    }
}
