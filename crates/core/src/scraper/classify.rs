//! Result-page classification and table-row mapping.
//!
//! Everything here is a pure transform over text the browser already
//! produced, so it is testable without a browser.

use regex_lite::Regex;
use serde::Deserialize;

use crate::violation::{parse_amount, Origin, Violation, ViolationStatus};

/// Default for location/agency on scraped records that omit them.
const DEFAULT_JURISDICTION: &str = "NYC";

/// Phrases the portal uses for a clean record. Matching any of these is a
/// successful empty result, not an error.
const NO_VIOLATION_PATTERNS: &[&str] = &[
    r"no\s+violations?\s+found",
    r"no\s+tickets?\s+found",
    r"no\s+records?\s+found",
    r"no\s+outstanding\s+violations?",
    r"no\s+parking\s+violations?",
    r"no\s+camera\s+violations?",
    r"there\s+are\s+no\s+violations?",
    r"0\s+violations?\s+found",
];

/// Keywords that mark a table row as violation data.
const VIOLATION_KEYWORDS: &[&str] = &[
    "violation",
    "ticket",
    "fine",
    "amount",
    "due",
    "issued",
    "date",
    "code",
    "status",
    "penalty",
    "paid",
    "outstanding",
    "parking",
    "camera",
];

/// Outcome classification of a portal page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageKind {
    /// Anti-bot challenge with the extracted site key.
    Challenge { site_key: String },
    /// Explicit "no violations" page.
    EmptyResults,
    /// Neither challenge nor empty marker; rows must be extracted.
    Results,
}

/// Classify a page by its HTML.
pub fn classify_page(html: &str) -> PageKind {
    if let Some(site_key) = extract_site_key(html) {
        return PageKind::Challenge { site_key };
    }

    let lower = html.to_lowercase();
    for pattern in NO_VIOLATION_PATTERNS {
        let re = Regex::new(pattern).expect("static regex");
        if re.is_match(&lower) {
            return PageKind::EmptyResults;
        }
    }

    PageKind::Results
}

/// Extract the reCAPTCHA site key when a challenge widget is present.
fn extract_site_key(html: &str) -> Option<String> {
    let marker = html.contains("g-recaptcha") || html.contains("recaptcha/api");
    if !marker && !html.contains("data-sitekey") {
        return None;
    }

    let re = Regex::new(r#"data-sitekey\s*=\s*["']([^"']+)["']"#).expect("static regex");
    re.captures(html)
        .map(|c| c.get(1).expect("capture group").as_str().to_string())
}

/// A candidate table row handed back by the in-page extraction script.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawRow {
    /// Header texts of the row's table, lower-cased by the script.
    pub headers: Vec<String>,
    /// Cell texts in column order.
    pub cells: Vec<String>,
}

impl RawRow {
    /// Returns true if the row plausibly holds violation data.
    fn looks_like_violation(&self) -> bool {
        if self.cells.len() < 3 {
            return false;
        }
        let row_text = self.cells.join(" ").to_lowercase();
        VIOLATION_KEYWORDS.iter().any(|k| row_text.contains(k))
            || self.cells.iter().any(|c| c.contains('$'))
    }
}

/// Map one table row into a violation record.
///
/// Columns are mapped positionally first (the portal's table layout is
/// summons, date, description, fine, status) and then refined by header
/// names when the header row lines up with the cells. Returns None for rows
/// that do not look like violation data.
pub fn map_row(row: &RawRow) -> Option<Violation> {
    if !row.looks_like_violation() {
        return None;
    }

    let cell = |idx: usize| -> Option<String> {
        row.cells
            .get(idx)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    };

    let mut summons_number = cell(0);
    let mut issue_date = cell(1);
    let mut description = cell(2);
    let mut fine_amount = cell(3).as_deref().and_then(parse_amount);
    let mut amount_due = None;
    let mut status_text = cell(4);
    let mut location = None;
    let mut agency = None;

    if row.headers.len() == row.cells.len() {
        for (header, raw) in row.headers.iter().zip(row.cells.iter()) {
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }
            if header.contains("summons") || header.contains("number") || header.contains("ticket")
            {
                summons_number = Some(value.to_string());
            } else if header.contains("date") {
                issue_date = Some(value.to_string());
            } else if header.contains("due") {
                amount_due = parse_amount(value);
            } else if header.contains("amount") || header.contains("fine") {
                fine_amount = parse_amount(value);
            } else if header.contains("status") {
                status_text = Some(value.to_string());
            } else if header.contains("type") || header.contains("code") {
                description = Some(value.to_string());
            } else if header.contains("location") || header.contains("street") {
                location = Some(value.to_string());
            } else if header.contains("agency") {
                agency = Some(value.to_string());
            }
        }
    }

    let summons_number = summons_number?;
    // Header rows reach here when a table nests its headers in <td>s.
    if summons_number.to_lowercase().contains("summons") {
        return None;
    }

    let status = status_text
        .as_deref()
        .map(parse_status)
        .unwrap_or(ViolationStatus::Unknown);

    let violation = Violation {
        summons_number,
        issue_date,
        violation_code: None,
        description,
        location: location.or_else(|| Some(DEFAULT_JURISDICTION.to_string())),
        agency: agency.or_else(|| Some(DEFAULT_JURISDICTION.to_string())),
        fine_amount,
        penalty_amount: None,
        interest_amount: None,
        reduction_amount: None,
        payment_amount: None,
        amount_due,
        status,
        ticket_image_url: None,
        origin: Origin::Scraped,
    };

    // normalized() clamps the balance and infers a status when the row had
    // no usable status column.
    Some(violation.normalized())
}

fn parse_status(raw: &str) -> ViolationStatus {
    let lower = raw.to_lowercase();
    if lower.contains("paid") {
        ViolationStatus::Paid
    } else if lower.contains("outstanding") || lower.contains("due") {
        ViolationStatus::Outstanding
    } else {
        ViolationStatus::Unknown
    }
}
