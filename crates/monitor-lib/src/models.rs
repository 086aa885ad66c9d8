//! Core data models for the transaction monitor

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, DurationRound, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Transaction outcome reported by the upstream processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Approved,
    Failed,
    Denied,
    Reversed,
    BackendReversed,
    Refunded,
}

impl TransactionStatus {
    pub const COUNT: usize = 6;

    /// Every status, in a stable order
    pub const ALL: [TransactionStatus; Self::COUNT] = [
        TransactionStatus::Approved,
        TransactionStatus::Failed,
        TransactionStatus::Denied,
        TransactionStatus::Reversed,
        TransactionStatus::BackendReversed,
        TransactionStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Approved => "approved",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Denied => "denied",
            TransactionStatus::Reversed => "reversed",
            TransactionStatus::BackendReversed => "backend_reversed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// Position in [`TransactionStatus::ALL`]
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| MonitorError::Validation(format!("unknown status '{}'", s)))
    }
}

/// Truncate a timestamp to minute resolution
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

/// Parse an ingestion timestamp.
///
/// Accepts RFC 3339 (`2025-07-12T13:45:00Z`) as well as the naive
/// `2025-07-12 13:45:00` / `2025-07-12T13:45:00` forms, which are read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, MonitorError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| MonitorError::Validation(format!("unparseable timestamp '{}'", raw)))
}

/// A per-minute count of transactions with a given status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
    pub count: u64,
}

impl Observation {
    /// Create an observation; the timestamp is truncated to the minute
    pub fn new(timestamp: DateTime<Utc>, status: TransactionStatus, count: u64) -> Self {
        Self {
            timestamp: truncate_to_minute(timestamp),
            status,
            count,
        }
    }

    /// Validate raw transport fields into an observation
    pub fn parse(timestamp: &str, status: &str, count: i64) -> Result<Self, MonitorError> {
        if count < 0 {
            return Err(MonitorError::Validation(format!(
                "count must be non-negative, got {}",
                count
            )));
        }
        let status = status.parse()?;
        let timestamp = parse_timestamp(timestamp)?;
        Ok(Self::new(timestamp, status, count as u64))
    }
}

/// Rate of one status over a trailing window. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMetric {
    pub status: TransactionStatus,
    pub window_count: u64,
    pub total_count: u64,
    /// Percentage in `[0, 100]`; 0 when the window is empty
    pub rate: f64,
    pub window_minutes: u32,
}

impl WindowMetric {
    pub fn new(
        status: TransactionStatus,
        window_count: u64,
        total_count: u64,
        window_minutes: u32,
    ) -> Self {
        Self {
            status,
            window_count,
            total_count,
            rate: rate_percent(window_count, total_count),
            window_minutes,
        }
    }

    /// True when there is nothing in the window to evaluate
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}

/// `100 * part / total`, clamped to `[0, 100]`, zero for an empty total
pub fn rate_percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (100.0 * part as f64 / total as f64).clamp(0.0, 100.0)
}

/// Historical rate statistics for one status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineStat {
    pub status: TransactionStatus,
    pub mean_rate: f64,
    /// `None` when too few minute buckets were available
    pub stddev_rate: Option<f64>,
    pub sample_size: usize,
    pub last_refreshed_at: DateTime<Utc>,
}

impl BaselineStat {
    /// Standardized deviation of `rate` from this baseline
    pub fn z_score(&self, rate: f64) -> Result<f64, MonitorError> {
        let std_dev = self.stddev_rate.ok_or(MonitorError::InsufficientData {
            what: "baseline",
            have: self.sample_size,
        })?;
        // rounding residue from a constant series is not variation
        let tolerance = f64::EPSILON * self.mean_rate.abs().max(1.0) * 16.0;
        if std_dev <= tolerance {
            return Err(MonitorError::InsufficientData {
                what: "baseline variance",
                have: self.sample_size,
            });
        }
        Ok((rate - self.mean_rate) / std_dev)
    }
}

/// Severity tier derived from the combined anomaly score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scoring one status in one evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyScore {
    pub status: TransactionStatus,
    pub rule_component: u32,
    pub statistical_component: u32,
    /// `rule_component + statistical_component`, capped at 100
    pub total: u32,
    pub severity: Severity,
}

impl AnomalyScore {
    /// Whether the score crosses the notification boundary
    pub fn should_alert(&self) -> bool {
        self.severity >= Severity::Warning
    }
}

/// Entry in the alert history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub status: TransactionStatus,
    pub severity: Severity,
    pub message: String,
    pub score: u32,
    /// Window rate that was evaluated
    pub rate: f64,
    /// Rule threshold that was breached, 0 when only the statistical check fired
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
    pub timestamp: DateTime<Utc>,
    /// False when the deduplicator suppressed the notification
    pub emitted: bool,
}

/// Outbound notification handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertMessage {
    pub status: TransactionStatus,
    pub severity: Severity,
    pub message: String,
    pub score: u32,
    pub timestamp: DateTime<Utc>,
}

impl From<&AlertRecord> for AlertMessage {
    fn from(record: &AlertRecord) -> Self {
        Self {
            status: record.status,
            severity: record.severity,
            message: record.message.clone(),
            score: record.score,
            timestamp: record.timestamp,
        }
    }
}
