//! Fixed-threshold rule checks

use std::collections::HashMap;

use crate::config::{default_thresholds, RuleThreshold};
use crate::models::TransactionStatus;

/// Score contributed when the critical threshold is reached
pub const RULE_CRITICAL_SCORE: u32 = 50;

/// Score contributed when the warning threshold is reached
pub const RULE_WARNING_SCORE: u32 = 30;

/// Applies per-status percentage thresholds to a window rate
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    thresholds: HashMap<TransactionStatus, RuleThreshold>,
}

impl RuleEvaluator {
    pub fn new(thresholds: HashMap<TransactionStatus, RuleThreshold>) -> Self {
        Self { thresholds }
    }

    /// Rule component for `rate`: 50, 30 or 0.
    ///
    /// Statuses without thresholds (approved, refunded) always score 0.
    pub fn evaluate(&self, status: TransactionStatus, rate: f64) -> u32 {
        match self.thresholds.get(&status) {
            Some(t) if rate >= t.critical_pct => RULE_CRITICAL_SCORE,
            Some(t) if rate >= t.warning_pct => RULE_WARNING_SCORE,
            _ => 0,
        }
    }

    /// Threshold that produced `component`, or 0.0 when none applies
    pub fn threshold_for(&self, status: TransactionStatus, component: u32) -> f64 {
        match (self.thresholds.get(&status), component) {
            (Some(t), RULE_CRITICAL_SCORE) => t.critical_pct,
            (Some(t), RULE_WARNING_SCORE) => t.warning_pct,
            _ => 0.0,
        }
    }

    pub fn thresholds(&self, status: TransactionStatus) -> Option<RuleThreshold> {
        self.thresholds.get(&status).copied()
    }

    /// Statuses with configured thresholds, in stable order
    pub fn monitored_statuses(&self) -> Vec<TransactionStatus> {
        let mut statuses: Vec<_> = self.thresholds.keys().copied().collect();
        statuses.sort();
        statuses
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(default_thresholds())
    }
}
