//! Filter predicate for invoice candidates.
//!
//! Pure: the result depends only on the metadata, the rule and the
//! evaluation instant passed in. All conditions must hold.

use chrono::{DateTime, Datelike, TimeZone};
use serde::Deserialize;

use crate::mailbox::types::MessageMetadata;

/// How far back a message may have been received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recency {
    /// Same calendar (year, month) as the evaluation instant.
    #[default]
    CurrentMonth,
    Unbounded,
}

/// Configured match rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    /// Exact, case-sensitive subject.
    pub subject: String,
    /// Case-insensitive substring matched against each sender domain.
    pub sender_domain: String,
    pub recency: Recency,
    /// Number of most recent messages to scan; 0 scans the whole mailbox.
    pub window: usize,
}

/// Check whether `meta` satisfies `rule` at instant `now`.
pub fn matches<Tz: TimeZone>(meta: &MessageMetadata, rule: &FilterRule, now: &DateTime<Tz>) -> bool {
    if rule.recency == Recency::CurrentMonth
        && (meta.received.year() != now.year() || meta.received.month() != now.month())
    {
        return false;
    }
    if meta.subject != rule.subject {
        return false;
    }
    let needle = rule.sender_domain.to_lowercase();
    meta.sender_domains
        .iter()
        .any(|domain| domain.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Months, Utc};

    fn rule() -> FilterRule {
        FilterRule {
            subject: "Deine Rechnung von Apple".into(),
            sender_domain: "apple.com".into(),
            recency: Recency::CurrentMonth,
            window: 0,
        }
    }

    fn meta(subject: &str, domains: &[&str], received: DateTime<FixedOffset>) -> MessageMetadata {
        MessageMetadata {
            uid: 1,
            sequence: 1,
            subject: subject.into(),
            sender_domains: domains.iter().map(|d| d.to_string()).collect(),
            received,
        }
    }

    fn at(rfc3339: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap()
    }

    #[test]
    fn matches_subject_domain_and_month() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta(
            "Deine Rechnung von Apple",
            &["email.apple.com"],
            at("2026-10-02T08:30:00+02:00"),
        );
        assert!(matches(&m, &rule(), &now));
    }

    #[test]
    fn rejects_wrong_subject() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta("Other Subject", &["email.apple.com"], now);
        assert!(!matches(&m, &rule(), &now));
    }

    #[test]
    fn subject_is_case_sensitive() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta("deine rechnung von apple", &["email.apple.com"], now);
        assert!(!matches(&m, &rule(), &now));
    }

    #[test]
    fn rejects_wrong_sender() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta("Deine Rechnung von Apple", &["other.com"], now);
        assert!(!matches(&m, &rule(), &now));
    }

    #[test]
    fn sender_match_is_case_insensitive() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta("Deine Rechnung von Apple", &["Email.APPLE.COM"], now);
        assert!(matches(&m, &rule(), &now));
    }

    #[test]
    fn any_sender_may_match() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta(
            "Deine Rechnung von Apple",
            &["relay.example.net", "apple.com"],
            now,
        );
        assert!(matches(&m, &rule(), &now));
    }

    #[test]
    fn empty_senders_never_match() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta("Deine Rechnung von Apple", &[], now);
        assert!(!matches(&m, &rule(), &now));
    }

    #[test]
    fn rejects_previous_month() {
        let now = Utc::now();
        let old = (now - Months::new(2)).fixed_offset();
        let m = meta("Deine Rechnung von Apple", &["email.apple.com"], old);
        assert!(!matches(&m, &rule(), &now));
    }

    #[test]
    fn same_month_previous_year_is_rejected() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta(
            "Deine Rechnung von Apple",
            &["apple.com"],
            at("2025-10-16T12:00:00+02:00"),
        );
        assert!(!matches(&m, &rule(), &now));
    }

    #[test]
    fn month_uses_store_offset_without_normalization() {
        // 23:30 on Sep 30 at -05:00 is already October in UTC.
        let now = at("2026-10-01T10:00:00+00:00");
        let m = meta(
            "Deine Rechnung von Apple",
            &["apple.com"],
            at("2026-09-30T23:30:00-05:00"),
        );
        assert!(!matches(&m, &rule(), &now));
    }

    #[test]
    fn unbounded_recency_ignores_date() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta(
            "Deine Rechnung von Apple",
            &["apple.com"],
            at("2019-01-01T00:00:00+00:00"),
        );
        let rule = FilterRule {
            recency: Recency::Unbounded,
            ..rule()
        };
        assert!(matches(&m, &rule, &now));
    }

    #[test]
    fn repeated_evaluation_is_stable() {
        let now = at("2026-10-16T12:00:00+02:00");
        let m = meta("Deine Rechnung von Apple", &["apple.com"], now);
        let r = rule();
        let first = matches(&m, &r, &now);
        assert!((0..10).all(|_| matches(&m, &r, &now) == first));
    }
}
