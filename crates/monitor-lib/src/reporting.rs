//! Read-only reports over alert history and observation history

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::minute_buckets;
use crate::anomaly::RuleEvaluator;
use crate::baseline::mean_and_stddev;
use crate::models::{AlertRecord, Observation, Severity, TransactionStatus};

/// Alerts grouped by severity and status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummaryRow {
    pub severity: Severity,
    pub status: TransactionStatus,
    pub alert_count: usize,
    pub emitted_count: usize,
    pub avg_score: f64,
    pub max_score: u32,
    pub first_alert: DateTime<Utc>,
    pub last_alert: DateTime<Utc>,
}

/// Summarize alerts at or after `since`.
///
/// Rows are ordered critical first, then by descending count.
pub fn summarize_alerts(records: &[AlertRecord], since: DateTime<Utc>) -> Vec<AlertSummaryRow> {
    let mut groups: BTreeMap<(Severity, TransactionStatus), Vec<&AlertRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.timestamp >= since) {
        groups
            .entry((record.severity, record.status))
            .or_default()
            .push(record);
    }

    let mut rows: Vec<AlertSummaryRow> = groups
        .into_iter()
        .filter_map(|((severity, status), group)| {
            let first_alert = group.iter().map(|r| r.timestamp).min()?;
            let last_alert = group.iter().map(|r| r.timestamp).max()?;
            let total: u64 = group.iter().map(|r| u64::from(r.score)).sum();
            Some(AlertSummaryRow {
                severity,
                status,
                alert_count: group.len(),
                emitted_count: group.iter().filter(|r| r.emitted).count(),
                avg_score: total as f64 / group.len() as f64,
                max_score: group.iter().map(|r| r.score).max().unwrap_or(0),
                first_alert,
                last_alert,
            })
        })
        .collect();

    rows.sort_by_key(|row| (Reverse(row.severity), Reverse(row.alert_count), row.status));
    rows
}

/// A minute whose rate crossed the critical threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalMinute {
    pub timestamp: DateTime<Utc>,
    pub rate: f64,
    pub count: u64,
    pub total: u64,
}

/// Per-minute rate profile of one status over a history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPattern {
    pub status: TransactionStatus,
    pub minutes: usize,
    pub mean_rate: f64,
    pub std_rate: f64,
    pub max_rate: f64,
    pub min_rate: f64,
    pub warning_pct: f64,
    pub critical_pct: f64,
    pub warning_minutes: usize,
    pub critical_minutes: usize,
    /// First few critical minutes, oldest first
    pub critical_samples: Vec<CriticalMinute>,
}

/// Number of critical minutes kept as examples
pub const CRITICAL_SAMPLE_LIMIT: usize = 3;

/// Profile every status with rule thresholds over `observations`
pub fn analyze_patterns(observations: &[Observation], rules: &RuleEvaluator) -> Vec<StatusPattern> {
    let buckets = minute_buckets(observations);
    let active: Vec<_> = buckets.iter().filter(|(_, c)| c.total() > 0).collect();

    rules
        .monitored_statuses()
        .into_iter()
        .filter_map(|status| {
            let thresholds = rules.thresholds(status)?;
            let rates: Vec<f64> = active.iter().map(|(_, c)| c.rate(status)).collect();
            if rates.is_empty() {
                return None;
            }

            let (mean, std) = mean_and_stddev(&rates);

            let critical_samples = active
                .iter()
                .filter(|(_, c)| c.rate(status) >= thresholds.critical_pct)
                .take(CRITICAL_SAMPLE_LIMIT)
                .map(|(ts, c)| CriticalMinute {
                    timestamp: **ts,
                    rate: c.rate(status),
                    count: c.count(status),
                    total: c.total(),
                })
                .collect();

            Some(StatusPattern {
                status,
                minutes: rates.len(),
                mean_rate: mean,
                std_rate: std,
                max_rate: rates.iter().copied().fold(f64::MIN, f64::max),
                min_rate: rates.iter().copied().fold(f64::MAX, f64::min),
                warning_pct: thresholds.warning_pct,
                critical_pct: thresholds.critical_pct,
                warning_minutes: rates.iter().filter(|r| **r >= thresholds.warning_pct).count(),
                critical_minutes: rates.iter().filter(|r| **r >= thresholds.critical_pct).count(),
                critical_samples,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 12, 13, 0, 0).unwrap() + TimeDelta::minutes(minute)
    }

    fn alert(status: TransactionStatus, severity: Severity, score: u32, minute: i64) -> AlertRecord {
        AlertRecord {
            status,
            severity,
            message: String::new(),
            score,
            rate: 0.0,
            threshold: 0.0,
            z_score: None,
            timestamp: at(minute),
            emitted: minute % 2 == 0,
        }
    }

    #[test]
    fn test_summary_groups_and_orders() {
        let records = vec![
            alert(TransactionStatus::Denied, Severity::Warning, 50, 1),
            alert(TransactionStatus::Denied, Severity::Warning, 55, 2),
            alert(TransactionStatus::Denied, Severity::Warning, 60, 3),
            alert(TransactionStatus::Failed, Severity::Critical, 90, 4),
            alert(TransactionStatus::Failed, Severity::Critical, 80, 6),
            alert(TransactionStatus::Reversed, Severity::Critical, 75, 5),
        ];

        let rows = summarize_alerts(&records, at(0));
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].status, TransactionStatus::Failed);
        assert_eq!(rows[0].alert_count, 2);
        assert_eq!(rows[0].emitted_count, 2);
        assert_eq!(rows[0].avg_score, 85.0);
        assert_eq!(rows[0].max_score, 90);
        assert_eq!(rows[0].first_alert, at(4));
        assert_eq!(rows[0].last_alert, at(6));

        assert_eq!(rows[1].status, TransactionStatus::Reversed);
        assert_eq!(rows[2].severity, Severity::Warning);
        assert_eq!(rows[2].alert_count, 3);
    }

    #[test]
    fn test_summary_respects_since() {
        let records = vec![
            alert(TransactionStatus::Failed, Severity::Critical, 90, 1),
            alert(TransactionStatus::Failed, Severity::Critical, 90, 10),
        ];
        let rows = summarize_alerts(&records, at(5));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alert_count, 1);
    }

    #[test]
    fn test_pattern_analysis() {
        let mut observations = Vec::new();
        for minute in 0..10 {
            let failed = if minute == 7 { 5 } else { 0 };
            observations.push(Observation::new(at(minute), TransactionStatus::Approved, 100 - failed));
            observations.push(Observation::new(at(minute), TransactionStatus::Failed, failed));
        }

        let patterns = analyze_patterns(&observations, &RuleEvaluator::default());
        let failed = patterns
            .iter()
            .find(|p| p.status == TransactionStatus::Failed)
            .unwrap();

        assert_eq!(failed.minutes, 10);
        assert_eq!(failed.max_rate, 5.0);
        assert_eq!(failed.min_rate, 0.0);
        assert!((failed.mean_rate - 0.5).abs() < 1e-9);
        assert_eq!(failed.warning_minutes, 1);
        assert_eq!(failed.critical_minutes, 1);
        assert_eq!(failed.critical_samples[0].timestamp, at(7));
        assert_eq!(failed.critical_samples[0].count, 5);
        assert_eq!(failed.critical_samples[0].total, 100);

        let denied = patterns
            .iter()
            .find(|p| p.status == TransactionStatus::Denied)
            .unwrap();
        assert_eq!(denied.std_rate, 0.0);

        assert!(patterns.iter().all(|p| p.status != TransactionStatus::Approved));
    }

    #[test]
    fn test_pattern_analysis_empty_history() {
        assert!(analyze_patterns(&[], &RuleEvaluator::default()).is_empty());
    }
}
