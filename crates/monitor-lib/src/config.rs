//! Detection engine configuration
//!
//! Every field has a default so a partial file or a handful of environment
//! variables is enough to override individual settings.

use std::collections::HashMap;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::models::TransactionStatus;

/// Warning/critical percentage pair for one status
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RuleThreshold {
    pub warning_pct: f64,
    pub critical_pct: f64,
}

impl RuleThreshold {
    pub const fn new(warning_pct: f64, critical_pct: f64) -> Self {
        Self {
            warning_pct,
            critical_pct,
        }
    }
}

/// Built-in rule table for failure-indicator statuses
pub fn default_thresholds() -> HashMap<TransactionStatus, RuleThreshold> {
    HashMap::from([
        (TransactionStatus::Failed, RuleThreshold::new(1.0, 2.0)),
        (TransactionStatus::Denied, RuleThreshold::new(10.0, 15.0)),
        (TransactionStatus::Reversed, RuleThreshold::new(2.0, 4.0)),
        (TransactionStatus::BackendReversed, RuleThreshold::new(0.5, 1.0)),
    ])
}

/// Tunables for the detection core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Trailing window used for live evaluation
    pub window_minutes: u32,
    /// Windows holding fewer observations than this are not scored
    pub min_window_observations: usize,
    /// Maximum observations held in memory
    pub store_capacity: usize,
    /// Observations older than this (relative to the newest one) are evicted
    pub retention_hours: u32,
    /// History scanned when refreshing the baseline
    pub baseline_horizon_hours: u32,
    /// Minute buckets required before a baseline stddev is trusted
    pub baseline_min_samples: usize,
    /// Time between background baseline refreshes
    pub baseline_refresh_secs: u64,
    pub sigma_warning: f64,
    pub sigma_critical: f64,
    /// Repeat alerts for a status are suppressed for this long
    pub cooldown_secs: u64,
    /// Number of alert records kept in memory
    pub alert_history_size: usize,
    /// Per-status overrides merged over the built-in rule table
    pub thresholds: HashMap<TransactionStatus, RuleThreshold>,
    /// Statuses whose downward deviations are also scored
    pub symmetric_statuses: Vec<TransactionStatus>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            min_window_observations: 5,
            store_capacity: 10_000,
            retention_hours: 72,
            baseline_horizon_hours: 72,
            baseline_min_samples: 30,
            baseline_refresh_secs: 3600,
            sigma_warning: 2.0,
            sigma_critical: 3.0,
            cooldown_secs: 300,
            alert_history_size: 100,
            thresholds: HashMap::new(),
            symmetric_statuses: Vec::new(),
        }
    }
}

impl DetectorConfig {
    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.window_minutes == 0 {
            return Err(MonitorError::Validation(
                "window_minutes must be positive".to_string(),
            ));
        }
        if self.store_capacity == 0 {
            return Err(MonitorError::Validation(
                "store_capacity must be positive".to_string(),
            ));
        }
        if self.baseline_refresh_secs == 0 {
            return Err(MonitorError::Validation(
                "baseline_refresh_secs must be positive".to_string(),
            ));
        }
        if self.sigma_warning > self.sigma_critical {
            return Err(MonitorError::Validation(format!(
                "sigma_warning ({}) exceeds sigma_critical ({})",
                self.sigma_warning, self.sigma_critical
            )));
        }
        for (status, threshold) in &self.thresholds {
            if threshold.warning_pct > threshold.critical_pct {
                return Err(MonitorError::Validation(format!(
                    "{}: warning_pct ({}) exceeds critical_pct ({})",
                    status, threshold.warning_pct, threshold.critical_pct
                )));
            }
        }
        Ok(())
    }

    /// Built-in rule table with configured overrides applied
    pub fn rule_table(&self) -> HashMap<TransactionStatus, RuleThreshold> {
        let mut table = default_thresholds();
        table.extend(self.thresholds.iter().map(|(s, t)| (*s, *t)));
        table
    }

    pub fn window(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.window_minutes))
    }

    pub fn retention(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.retention_hours))
    }

    pub fn baseline_horizon(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.baseline_horizon_hours))
    }

    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.cooldown_secs as i64)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.baseline_refresh_secs)
    }
}
