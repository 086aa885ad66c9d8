//! Anomaly scoring for transaction status rates
//!
//! This module provides:
//! - Fixed-threshold rule checks per status
//! - Z-score checks against the historical baseline
//! - Combination of both into a 0-100 score and severity tier
//! - Per-status alert deduplication with a cool-down

mod classifier;
mod dedup;
mod rules;
mod statistical;

pub use classifier::{classify, severity_for, CRITICAL_SCORE, MAX_SCORE, WARNING_SCORE};
pub use dedup::{
    alert_message, AlertContext, AlertDecision, AlertDeduplicator, DedupState,
    DEFAULT_COOLDOWN_SECS, DEFAULT_HISTORY_SIZE,
};
pub use rules::{RuleEvaluator, RULE_CRITICAL_SCORE, RULE_WARNING_SCORE};
pub use statistical::{
    DeviationMode, StatisticalEvaluator, StatisticalResult, STAT_CRITICAL_SCORE,
    STAT_WARNING_SCORE,
};
