//! Multi-source reconciliation.
//!
//! The portal and the open-data API independently report violations for the
//! same plate. Records are keyed by summons number; when both sources report
//! the same key the merged record keeps each field from whichever source has
//! a non-blank value, with ties broken by the configured precedence rather
//! than a hardcoded source priority.

use std::collections::HashMap;

use tracing::debug;

use crate::config::{PreferredSource, ReconcileConfig};
use crate::violation::{Origin, Violation};

/// Field-level merge of two violation lists.
pub struct Reconciler {
    prefer: PreferredSource,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self {
            prefer: config.prefer,
        }
    }

    /// Merge scraped and API records into one canonical, ordered list.
    ///
    /// Commutative over disjoint keys and idempotent under repeated
    /// application: merging the output with either input again yields an
    /// equal list.
    pub fn merge(&self, scraped: Vec<Violation>, api: Vec<Violation>) -> Vec<Violation> {
        let mut api_by_key: HashMap<String, Violation> = api
            .into_iter()
            .map(|v| (v.summons_number.clone(), v))
            .collect();

        let mut merged: Vec<Violation> = Vec::new();

        for violation in scraped {
            match api_by_key.remove(&violation.summons_number) {
                Some(api_violation) => {
                    merged.push(self.merge_pair(violation, api_violation));
                }
                None => merged.push(violation),
            }
        }

        // Records only the API knows about.
        merged.extend(api_by_key.into_values());

        // Deterministic output order: newest first, summons as tie-break.
        merged.sort_by(|a, b| {
            b.issue_date
                .cmp(&a.issue_date)
                .then_with(|| a.summons_number.cmp(&b.summons_number))
        });

        debug!(total = merged.len(), "Reconciliation complete");
        merged
    }

    /// Fraction of violations whose date, amount due and status are all
    /// present. Always within [0, 1]; an empty list is vacuously complete.
    pub fn completeness(violations: &[Violation]) -> f64 {
        if violations.is_empty() {
            return 1.0;
        }
        let complete = violations.iter().filter(|v| v.is_complete()).count();
        complete as f64 / violations.len() as f64
    }

    fn merge_pair(&self, scraped: Violation, api: Violation) -> Violation {
        let (primary, secondary) = match self.prefer {
            PreferredSource::Scraped => (scraped, api),
            PreferredSource::Api => (api, scraped),
        };

        let status = if primary.status.is_known() {
            primary.status
        } else {
            secondary.status
        };

        // Two records of the same origin (a re-merge) keep it; a genuine
        // two-source pair is tagged merged. This keeps merge idempotent.
        let origin = if primary.origin == secondary.origin {
            primary.origin
        } else {
            Origin::Merged
        };

        let merged = Violation {
            summons_number: primary.summons_number,
            issue_date: pick_text(primary.issue_date, secondary.issue_date),
            violation_code: pick_text(primary.violation_code, secondary.violation_code),
            description: pick_text(primary.description, secondary.description),
            location: pick_text(primary.location, secondary.location),
            agency: pick_text(primary.agency, secondary.agency),
            fine_amount: primary.fine_amount.or(secondary.fine_amount),
            penalty_amount: primary.penalty_amount.or(secondary.penalty_amount),
            interest_amount: primary.interest_amount.or(secondary.interest_amount),
            reduction_amount: primary.reduction_amount.or(secondary.reduction_amount),
            payment_amount: primary.payment_amount.or(secondary.payment_amount),
            amount_due: primary.amount_due.or(secondary.amount_due),
            status,
            ticket_image_url: pick_text(primary.ticket_image_url, secondary.ticket_image_url),
            origin,
        };

        merged.normalized()
    }
}

/// First non-blank value wins.
fn pick_text(primary: Option<String>, secondary: Option<String>) -> Option<String> {
    primary
        .filter(|s| !s.trim().is_empty())
        .or(secondary.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violation::{infer_status, Origin, ViolationStatus};

    fn reconciler() -> Reconciler {
        Reconciler::new(ReconcileConfig::default())
    }

    fn scraped(summons: &str, amount_due: f64) -> Violation {
        let mut v = Violation::new(summons, Origin::Scraped);
        v.issue_date = Some("2024-06-15".into());
        v.amount_due = Some(amount_due);
        v.status = infer_status(v.amount_due, None);
        v
    }

    fn api(summons: &str, amount_due: f64, paid: f64) -> Violation {
        let mut v = Violation::new(summons, Origin::Api);
        v.issue_date = Some("2024-06-15".into());
        v.amount_due = Some(amount_due);
        v.payment_amount = Some(paid);
        v.status = infer_status(v.amount_due, v.payment_amount);
        v
    }

    #[test]
    fn test_single_source_records_keep_origin() {
        let r = reconciler();
        let mut out = r.merge(
            vec![scraped("8001234567", 65.0)],
            vec![api("8001234999", 0.0, 35.0)],
        );
        out.sort_by(|a, b| a.summons_number.cmp(&b.summons_number));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].summons_number, "8001234567");
        assert_eq!(out[0].origin, Origin::Scraped);
        assert_eq!(out[0].status, ViolationStatus::Outstanding);
        assert_eq!(out[1].summons_number, "8001234999");
        assert_eq!(out[1].origin, Origin::Api);
        assert_eq!(out[1].status, ViolationStatus::Paid);
    }

    #[test]
    fn test_shared_key_is_merged() {
        let r = reconciler();
        let mut s = scraped("800", 65.0);
        s.description = None;
        let mut a = api("800", 65.0, 0.0);
        a.description = Some("NO STANDING".into());
        a.ticket_image_url = Some("https://img.example/800.pdf".into());

        let out = r.merge(vec![s], vec![a]);
        assert_eq!(out.len(), 1);
        let merged = &out[0];
        assert_eq!(merged.origin, Origin::Merged);
        // Blank scraped field filled from the API side.
        assert_eq!(merged.description.as_deref(), Some("NO STANDING"));
        assert_eq!(
            merged.ticket_image_url.as_deref(),
            Some("https://img.example/800.pdf")
        );
    }

    #[test]
    fn test_conflict_resolved_by_precedence() {
        let scraped_v = || {
            let mut v = scraped("800", 90.0);
            v.agency = Some("NYC".into());
            v
        };
        let api_v = || {
            let mut v = api("800", 65.0, 0.0);
            v.agency = Some("TRAFFIC".into());
            v
        };

        let prefer_scraped = Reconciler::new(ReconcileConfig {
            prefer: PreferredSource::Scraped,
        });
        let out = prefer_scraped.merge(vec![scraped_v()], vec![api_v()]);
        assert_eq!(out[0].amount_due, Some(90.0));
        assert_eq!(out[0].agency.as_deref(), Some("NYC"));

        let prefer_api = Reconciler::new(ReconcileConfig {
            prefer: PreferredSource::Api,
        });
        let out = prefer_api.merge(vec![scraped_v()], vec![api_v()]);
        assert_eq!(out[0].amount_due, Some(65.0));
        assert_eq!(out[0].agency.as_deref(), Some("TRAFFIC"));
    }

    #[test]
    fn test_commutative_over_disjoint_keys() {
        let r = reconciler();
        let a = vec![scraped("1", 10.0), scraped("2", 20.0)];
        let b = vec![api("3", 0.0, 30.0)];

        let ab = r.merge(a.clone(), b.clone());
        let ba = r.merge(b.clone(), a.clone());
        // Disjoint keys: same set either way (origins included, since no
        // record is merged).
        let key = |v: &Violation| (v.summons_number.clone(), v.origin);
        let mut ab_keys: Vec<_> = ab.iter().map(key).collect();
        let mut ba_keys: Vec<_> = ba.iter().map(key).collect();
        ab_keys.sort();
        ba_keys.sort();
        assert_eq!(ab_keys, ba_keys);
    }

    #[test]
    fn test_idempotent_under_reapplication() {
        let r = reconciler();
        let a = vec![scraped("1", 10.0), scraped("2", 20.0)];
        let b = vec![api("2", 20.0, 0.0), api("3", 0.0, 30.0)];

        let once = r.merge(a, b.clone());
        let twice = r.merge(once.clone(), b);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_completeness_bounds() {
        assert_eq!(Reconciler::completeness(&[]), 1.0);

        let complete = scraped("1", 65.0);
        let mut incomplete = scraped("2", 65.0);
        incomplete.issue_date = None;

        let score = Reconciler::completeness(&[complete.clone(), incomplete]);
        assert!(score > 0.0 && score < 1.0);
        assert_eq!(Reconciler::completeness(&[complete]), 1.0);
    }

    #[test]
    fn test_output_ordered_newest_first() {
        let r = reconciler();
        let mut older = scraped("2", 10.0);
        older.issue_date = Some("2023-01-01".into());
        let mut newer = scraped("1", 10.0);
        newer.issue_date = Some("2024-01-01".into());

        let out = r.merge(vec![older, newer], vec![]);
        assert_eq!(out[0].summons_number, "1");
        assert_eq!(out[1].summons_number, "2");
    }
}
