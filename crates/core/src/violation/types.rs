//! Violation, query and result types shared across the pipeline.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

// ============================================================================
// Query
// ============================================================================

/// A normalized (license plate, state) lookup query.
///
/// Plate and state are trimmed and upper-cased on construction; the pair is
/// the natural cache and job-idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Query {
    /// License plate, trimmed and upper-cased.
    pub license_plate: String,
    /// Two-letter state code, upper-cased.
    pub state: String,
}

impl Query {
    /// Normalize and validate a raw plate/state pair.
    pub fn new(license_plate: &str, state: &str) -> Result<Self, LookupError> {
        let license_plate = license_plate.trim().to_uppercase();
        let state = state.trim().to_uppercase();

        let plate_re = Regex::new(r"^[A-Z0-9]{1,12}$").expect("static regex");
        if !plate_re.is_match(&license_plate) {
            return Err(LookupError::ValidationError(format!(
                "invalid license plate: {:?}",
                license_plate
            )));
        }

        let state_re = Regex::new(r"^[A-Z]{2}$").expect("static regex");
        if !state_re.is_match(&state) {
            return Err(LookupError::ValidationError(format!(
                "invalid state code: {:?}",
                state
            )));
        }

        Ok(Self {
            license_plate,
            state,
        })
    }

    /// Key used for result caching and in-flight job deduplication.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.license_plate, self.state)
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.license_plate, self.state)
    }
}

// ============================================================================
// Violation
// ============================================================================

/// Payment status of a violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationStatus {
    Paid,
    Outstanding,
    Unknown,
}

impl ViolationStatus {
    /// Returns true when the status carries information (not UNKNOWN).
    pub fn is_known(&self) -> bool {
        !matches!(self, ViolationStatus::Unknown)
    }
}

/// Which source(s) a violation record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// Parsed from the portal results page.
    Scraped,
    /// Returned by the open-data reference API.
    Api,
    /// Present in both sources, fields reconciled.
    Merged,
}

/// A single parking violation record.
///
/// `summons_number` is the unique key used for reconciliation. All other
/// fields are optional because neither upstream source guarantees them;
/// blank fields are filled during merging when the other source has a value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    /// Unique summons identifier.
    pub summons_number: String,

    /// Issue date as reported by the source (kept verbatim; formats differ
    /// between the portal and the API).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,

    /// Violation code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation_code: Option<String>,

    /// Human-readable violation description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Location (street, county or precinct).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Issuing agency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agency: Option<String>,

    /// Original fine amount in dollars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fine_amount: Option<f64>,

    /// Penalty added on top of the fine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_amount: Option<f64>,

    /// Accrued interest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_amount: Option<f64>,

    /// Reductions granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduction_amount: Option<f64>,

    /// Payments received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<f64>,

    /// Outstanding balance. Never negative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_due: Option<f64>,

    /// Payment status, inferred from amounts when the source omits it.
    pub status: ViolationStatus,

    /// URL of the scanned ticket image, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_image_url: Option<String>,

    /// Which source(s) this record came from.
    pub origin: Origin,
}

impl Violation {
    /// Create an empty record for the given summons number and origin.
    pub fn new(summons_number: impl Into<String>, origin: Origin) -> Self {
        Self {
            summons_number: summons_number.into(),
            issue_date: None,
            violation_code: None,
            description: None,
            location: None,
            agency: None,
            fine_amount: None,
            penalty_amount: None,
            interest_amount: None,
            reduction_amount: None,
            payment_amount: None,
            amount_due: None,
            status: ViolationStatus::Unknown,
            ticket_image_url: None,
            origin,
        }
    }

    /// Enforce the amount invariant and fill in a status inferred from the
    /// amounts when the source did not report one.
    pub fn normalized(mut self) -> Self {
        if let Some(due) = self.amount_due {
            self.amount_due = Some(due.max(0.0));
        }
        if self.status == ViolationStatus::Unknown {
            self.status = infer_status(self.amount_due, self.payment_amount);
        }
        self
    }

    /// Returns true if date, amount due and status are all present.
    /// This is the per-record input to the completeness score.
    pub fn is_complete(&self) -> bool {
        self.issue_date.as_deref().is_some_and(|d| !d.is_empty())
            && self.amount_due.is_some()
            && self.status.is_known()
    }
}

/// Infer a payment status from the financial fields.
///
/// A zero balance only counts as PAID when a payment was actually recorded;
/// otherwise a missing balance is indistinguishable from a clean record.
pub fn infer_status(amount_due: Option<f64>, payment_amount: Option<f64>) -> ViolationStatus {
    match amount_due {
        Some(due) if due > 0.0 => ViolationStatus::Outstanding,
        Some(_) if payment_amount.is_some_and(|p| p > 0.0) => ViolationStatus::Paid,
        _ => ViolationStatus::Unknown,
    }
}

/// Leniently parse a dollar amount from upstream text ("$65.00", "1,240.50").
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

// ============================================================================
// Results
// ============================================================================

/// Quality metadata attached to a merged result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMetadata {
    /// Fraction of violations with date, amount due and status present.
    pub completeness: f64,
    /// Wall-clock time spent producing the result, in seconds.
    pub processing_time_secs: f64,
    /// Names of the sources that contributed records.
    pub data_sources: Vec<String>,
    /// Number of ticket images fetched by the bulk-download job.
    pub downloaded_images: u32,
}

/// The canonical reconciled answer for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnhancedResult {
    pub query: Query,
    /// Violations ordered by issue date descending, then summons number.
    pub violations: Vec<Violation>,
    pub metadata: ResultMetadata,
    /// When this result was produced.
    pub fetched_at: DateTime<Utc>,
}

impl EnhancedResult {
    /// Summary statistics over the violation list.
    pub fn summary(&self) -> ViolationSummary {
        ViolationSummary::from_violations(&self.violations)
    }
}

/// Aggregate statistics used by the report header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViolationSummary {
    pub total_violations: usize,
    pub total_amount_due: f64,
    pub paid_violations: usize,
    pub outstanding_violations: usize,
    /// Distinct issuing agencies, sorted.
    pub agencies: Vec<String>,
}

impl ViolationSummary {
    pub fn from_violations(violations: &[Violation]) -> Self {
        let total_amount_due = violations.iter().filter_map(|v| v.amount_due).sum();
        let paid_violations = violations
            .iter()
            .filter(|v| v.status == ViolationStatus::Paid)
            .count();
        let outstanding_violations = violations
            .iter()
            .filter(|v| v.status == ViolationStatus::Outstanding)
            .count();

        let mut agencies: Vec<String> = violations
            .iter()
            .filter_map(|v| v.agency.clone())
            .filter(|a| !a.is_empty())
            .collect();
        agencies.sort();
        agencies.dedup();

        Self {
            total_violations: violations.len(),
            total_amount_due,
            paid_violations,
            outstanding_violations,
            agencies,
        }
    }
}
