//! Combines rule and statistical components into a severity tier

use crate::models::{AnomalyScore, Severity, TransactionStatus};

/// Upper bound on the combined score
pub const MAX_SCORE: u32 = 100;

/// Lowest total classified as critical
pub const CRITICAL_SCORE: u32 = 75;

/// Lowest total classified as warning, and the notification boundary
pub const WARNING_SCORE: u32 = 50;

/// Severity for a combined total
pub fn severity_for(total: u32) -> Severity {
    if total >= CRITICAL_SCORE {
        Severity::Critical
    } else if total >= WARNING_SCORE {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// Build the [`AnomalyScore`] for one status.
///
/// `total = min(100, rule + statistical)`.
pub fn classify(
    status: TransactionStatus,
    rule_component: u32,
    statistical_component: u32,
) -> AnomalyScore {
    let total = rule_component
        .saturating_add(statistical_component)
        .min(MAX_SCORE);

    AnomalyScore {
        status,
        rule_component,
        statistical_component,
        total,
        severity: severity_for(total),
    }
}
