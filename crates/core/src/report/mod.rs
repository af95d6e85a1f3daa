//! Violation report rendering.
//!
//! A pure transform over an already-fetched result: no network calls. The
//! layout is deterministic for a fixed result and timestamp, so report bytes
//! are reproducible and cacheable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::job::Job;
use crate::violation::{EnhancedResult, Violation, ViolationStatus};

const LINE_WIDTH: usize = 80;
/// Row cap for the violation tables.
const MAX_TABLE_ROWS: usize = 10;

/// Render the report document for a result.
///
/// `job` supplies ticket-image information when a bulk download already ran;
/// without it the report is text-only. `generated_at` is injected so the
/// output is deterministic.
pub fn render_report(
    result: &EnhancedResult,
    job: Option<&Job>,
    generated_at: DateTime<Utc>,
) -> Vec<u8> {
    let mut lines: Vec<String> = Vec::new();
    let rule = "=".repeat(LINE_WIDTH);
    let thin_rule = "-".repeat(40);

    lines.push(rule.clone());
    lines.push("PARKING VIOLATIONS REPORT".to_string());
    lines.push(rule.clone());
    lines.push(String::new());

    lines.push("VEHICLE INFORMATION".to_string());
    lines.push(thin_rule.clone());
    lines.push(format!("License Plate: {}", result.query.license_plate));
    lines.push(format!("State: {}", result.query.state));
    lines.push(format!(
        "Report Generated: {}",
        generated_at.format("%B %d, %Y at %H:%M UTC")
    ));
    lines.push(format!(
        "Data Sources: {}",
        result.metadata.data_sources.join(", ")
    ));
    lines.push(String::new());

    if result.violations.is_empty() {
        push_clean_record(&mut lines, result, &thin_rule);
    } else {
        push_summary(&mut lines, result, &thin_rule);
        push_violation_tables(&mut lines, &result.violations, &thin_rule);
        push_agency_breakdown(&mut lines, &result.violations, &thin_rule);
    }

    if let Some(job) = job {
        push_downloaded_images(&mut lines, job, &thin_rule);
    }

    lines.push(String::new());
    lines.push(rule.clone());
    lines.push("This report was generated from official municipal records.".to_string());
    lines.push("For the most current information, visit the issuing authority.".to_string());
    lines.push(rule);

    let mut bytes = lines.join("\n").into_bytes();
    bytes.push(b'\n');
    bytes
}

fn push_clean_record(lines: &mut Vec<String>, result: &EnhancedResult, thin_rule: &str) {
    lines.push("VIOLATION RESULTS".to_string());
    lines.push(thin_rule.to_string());
    lines.push(format!(
        "No parking violations were found for license plate {} from {}.",
        result.query.license_plate, result.query.state
    ));
    lines.push("This vehicle has a clean record.".to_string());
    lines.push(String::new());
}

fn push_summary(lines: &mut Vec<String>, result: &EnhancedResult, thin_rule: &str) {
    let summary = result.summary();

    lines.push("SUMMARY STATISTICS".to_string());
    lines.push(thin_rule.to_string());
    lines.push(format!("Total Violations: {}", summary.total_violations));
    lines.push(format!("Total Amount Due: ${:.2}", summary.total_amount_due));
    lines.push(format!(
        "Outstanding Violations: {}",
        summary.outstanding_violations
    ));
    lines.push(format!("Paid Violations: {}", summary.paid_violations));

    let mut dates: Vec<&str> = result
        .violations
        .iter()
        .filter_map(|v| v.issue_date.as_deref())
        .collect();
    dates.sort_unstable();
    if let (Some(first), Some(last)) = (dates.first(), dates.last()) {
        lines.push(format!("Date Range: {} to {}", first, last));
    }

    if let Some(most_common) = most_common_violation(&result.violations) {
        lines.push(format!("Most Common Violation: {}", most_common));
    }

    lines.push(format!(
        "Data Completeness: {:.0}%",
        result.metadata.completeness * 100.0
    ));
    lines.push(String::new());
}

fn most_common_violation(violations: &[Violation]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in violations {
        if let Some(desc) = v.description.as_deref().filter(|d| !d.is_empty()) {
            *counts.entry(desc).or_insert(0) += 1;
        }
    }
    // Alphabetical tie-break keeps the output deterministic.
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(desc, _)| desc.to_string())
}

fn push_violation_tables(lines: &mut Vec<String>, violations: &[Violation], thin_rule: &str) {
    let outstanding: Vec<&Violation> = violations
        .iter()
        .filter(|v| v.status == ViolationStatus::Outstanding)
        .collect();

    if !outstanding.is_empty() {
        lines.push(format!("OUTSTANDING VIOLATIONS ({})", outstanding.len()));
        lines.push(thin_rule.to_string());
        push_table(lines, &outstanding);
        lines.push(String::new());
    }

    lines.push(format!("RECENT VIOLATIONS (Last {})", MAX_TABLE_ROWS));
    lines.push(thin_rule.to_string());
    // Already ordered newest first by the reconciler.
    let recent: Vec<&Violation> = violations.iter().collect();
    push_table(lines, &recent);
    lines.push(String::new());
}

fn push_table(lines: &mut Vec<String>, violations: &[&Violation]) {
    lines.push(format!(
        "{:<12} {:<35} {:<8} {:<8} {:<12}",
        "Date", "Violation", "Fine", "Due", "Status"
    ));
    lines.push("-".repeat(LINE_WIDTH));

    for v in violations.iter().take(MAX_TABLE_ROWS) {
        let date: String = v
            .issue_date
            .as_deref()
            .unwrap_or("N/A")
            .chars()
            .take(10)
            .collect();
        let desc = v.description.as_deref().unwrap_or("N/A");
        let desc: String = desc.chars().take(32).collect();
        let fine = v
            .fine_amount
            .map(|a| format!("${:.0}", a))
            .unwrap_or_else(|| "N/A".to_string());
        let due = v
            .amount_due
            .map(|a| format!("${:.0}", a))
            .unwrap_or_else(|| "N/A".to_string());
        let status = match v.status {
            ViolationStatus::Paid => "PAID",
            ViolationStatus::Outstanding => "OUTSTANDING",
            ViolationStatus::Unknown => "UNKNOWN",
        };

        lines.push(format!(
            "{:<12} {:<35} {:<8} {:<8} {:<12}",
            date, desc, fine, due, status
        ));
    }
}

fn push_agency_breakdown(lines: &mut Vec<String>, violations: &[Violation], thin_rule: &str) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in violations {
        let agency = v.agency.as_deref().unwrap_or("Unknown");
        *counts.entry(agency).or_insert(0) += 1;
    }

    if counts.len() <= 1 {
        return;
    }

    lines.push("VIOLATIONS BY AGENCY".to_string());
    lines.push(thin_rule.to_string());

    let total = violations.len();
    let mut entries: Vec<(&str, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    for (agency, count) in entries {
        let percentage = (count as f64 / total as f64) * 100.0;
        lines.push(format!("{:<40} {:>5} ({:>5.1}%)", agency, count, percentage));
    }
    lines.push(String::new());
}

fn push_downloaded_images(lines: &mut Vec<String>, job: &Job, thin_rule: &str) {
    let downloaded: Vec<_> = job.outcomes.iter().filter(|o| o.success).collect();
    if downloaded.is_empty() {
        return;
    }

    lines.push(format!("DOWNLOADED TICKET IMAGES ({})", downloaded.len()));
    lines.push(thin_rule.to_string());
    for outcome in downloaded {
        lines.push(format!(
            "ticket_{}.pdf ({} bytes)",
            outcome.summons_number,
            outcome.bytes.unwrap_or(0)
        ));
    }
    lines.push(String::new());
}
