//! Shared test fixtures.

use crate::violation::{Origin, Query, Violation, ViolationStatus};

/// A valid NY query for the given plate.
pub fn query(plate: &str) -> Query {
    Query::new(plate, "NY").expect("fixture plate must be valid")
}

/// An outstanding violation with the given balance.
pub fn outstanding(summons: &str, amount_due: f64) -> Violation {
    let mut v = Violation::new(summons, Origin::Scraped);
    v.issue_date = Some("2024-06-15".to_string());
    v.description = Some("NO PARKING-STREET CLEANING".to_string());
    v.fine_amount = Some(amount_due);
    v.amount_due = Some(amount_due);
    v.status = ViolationStatus::Outstanding;
    v.location = Some("NYC".to_string());
    v.agency = Some("TRAFFIC".to_string());
    v
}

/// A paid violation.
pub fn paid(summons: &str) -> Violation {
    let mut v = Violation::new(summons, Origin::Api);
    v.issue_date = Some("2024-01-10".to_string());
    v.description = Some("METER EXPIRED".to_string());
    v.fine_amount = Some(35.0);
    v.payment_amount = Some(35.0);
    v.amount_due = Some(0.0);
    v.status = ViolationStatus::Paid;
    v.agency = Some("TRAFFIC".to_string());
    v
}

/// An outstanding violation with a ticket-image URL attached.
pub fn with_image(summons: &str, amount_due: f64, url: &str) -> Violation {
    let mut v = outstanding(summons, amount_due);
    v.ticket_image_url = Some(url.to_string());
    v
}
