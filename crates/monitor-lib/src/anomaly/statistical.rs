//! Z-score scoring against the historical baseline
//!
//! Compares the current window rate with the baseline mean in units of the
//! baseline standard deviation. Missing or flat baselines contribute nothing:
//! without variance there is no way to say a rate is unusual.

use std::collections::HashSet;

use crate::models::{BaselineStat, TransactionStatus};

/// Default z-score for the warning tier
pub const DEFAULT_SIGMA_WARNING: f64 = 2.0;

/// Default z-score for the critical tier
pub const DEFAULT_SIGMA_CRITICAL: f64 = 3.0;

/// Score contributed at or above the critical sigma
pub const STAT_CRITICAL_SCORE: u32 = 40;

/// Score contributed at or above the warning sigma
pub const STAT_WARNING_SCORE: u32 = 25;

/// Which direction of deviation counts as anomalous
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviationMode {
    /// Only rates above the mean are scored (failure-type statuses)
    UpperOnly,
    /// Rates far below the mean are scored as well
    Symmetric,
}

/// Outcome of a statistical check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticalResult {
    pub component: u32,
    /// `None` when the baseline could not support a z-score
    pub z_score: Option<f64>,
}

/// Scores a rate against a [`BaselineStat`]
#[derive(Debug, Clone)]
pub struct StatisticalEvaluator {
    sigma_warning: f64,
    sigma_critical: f64,
    symmetric: HashSet<TransactionStatus>,
}

impl StatisticalEvaluator {
    pub fn new(sigma_warning: f64, sigma_critical: f64) -> Self {
        Self {
            sigma_warning,
            sigma_critical,
            symmetric: HashSet::new(),
        }
    }

    /// Also score downward deviations for these statuses
    pub fn with_symmetric(mut self, statuses: impl IntoIterator<Item = TransactionStatus>) -> Self {
        self.symmetric.extend(statuses);
        self
    }

    pub fn mode(&self, status: TransactionStatus) -> DeviationMode {
        if self.symmetric.contains(&status) {
            DeviationMode::Symmetric
        } else {
            DeviationMode::UpperOnly
        }
    }

    pub fn is_symmetric(&self, status: TransactionStatus) -> bool {
        self.mode(status) == DeviationMode::Symmetric
    }

    /// Statistical component for `rate`: 40, 25 or 0
    pub fn evaluate(&self, rate: f64, baseline: Option<&BaselineStat>) -> u32 {
        self.assess(rate, baseline).component
    }

    /// Statistical component together with the z-score it was derived from
    pub fn assess(&self, rate: f64, baseline: Option<&BaselineStat>) -> StatisticalResult {
        let Some(baseline) = baseline else {
            return StatisticalResult {
                component: 0,
                z_score: None,
            };
        };

        let z_score = match baseline.z_score(rate) {
            Ok(z) if z.is_finite() => z,
            _ => {
                return StatisticalResult {
                    component: 0,
                    z_score: None,
                }
            }
        };

        let deviation = match self.mode(baseline.status) {
            DeviationMode::UpperOnly => z_score,
            DeviationMode::Symmetric => z_score.abs(),
        };

        let component = if deviation >= self.sigma_critical {
            STAT_CRITICAL_SCORE
        } else if deviation >= self.sigma_warning {
            STAT_WARNING_SCORE
        } else {
            0
        };

        StatisticalResult {
            component,
            z_score: Some(z_score),
        }
    }
}

impl Default for StatisticalEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_SIGMA_WARNING, DEFAULT_SIGMA_CRITICAL)
    }
}
