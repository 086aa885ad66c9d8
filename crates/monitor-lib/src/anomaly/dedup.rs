//! Alert deduplication and history
//!
//! Each status moves between two states:
//! - `Quiet`: nothing outstanding; the next score at or above 50 emits
//! - `Alerted`: an alert went out at some severity and time
//!
//! While alerted, repeats at the same or lower severity are suppressed until
//! the cool-down has elapsed. Escalation emits immediately. A sub-threshold
//! score after the cool-down returns the status to `Quiet`.
//!
//! Suppressed alerts are still written to history with `emitted = false`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::models::{AlertRecord, AnomalyScore, Severity, TransactionStatus};

/// Default cool-down (5 minutes)
pub const DEFAULT_COOLDOWN_SECS: i64 = 5 * 60;

/// Default number of alert records kept in memory
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Deduplication state of one status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DedupState {
    Quiet,
    Alerted {
        severity: Severity,
        last_emitted_at: DateTime<Utc>,
    },
}

/// Evaluation details carried into the alert record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertContext {
    pub rate: f64,
    pub window_count: u64,
    pub threshold: f64,
    pub z_score: Option<f64>,
}

/// Outcome of [`AlertDeduplicator::consider`]
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDecision {
    pub emit: bool,
    /// `None` when the score is below the notification boundary
    pub record: Option<AlertRecord>,
}

impl AlertDecision {
    fn none() -> Self {
        Self {
            emit: false,
            record: None,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    states: HashMap<TransactionStatus, DedupState>,
    history: VecDeque<AlertRecord>,
}

/// Per-status alert suppression with bounded history
pub struct AlertDeduplicator {
    cooldown: TimeDelta,
    history_size: usize,
    inner: Mutex<Inner>,
}

impl AlertDeduplicator {
    pub fn new(cooldown: TimeDelta, history_size: usize) -> Self {
        Self {
            cooldown,
            history_size: history_size.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Decide whether `score` should produce a notification at `now`
    pub fn consider(
        &self,
        score: &AnomalyScore,
        ctx: &AlertContext,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let state = inner
            .states
            .get(&score.status)
            .copied()
            .unwrap_or(DedupState::Quiet);

        if !score.should_alert() {
            if let DedupState::Alerted {
                last_emitted_at, ..
            } = state
            {
                if now - last_emitted_at >= self.cooldown {
                    inner.states.insert(score.status, DedupState::Quiet);
                }
            }
            return AlertDecision::none();
        }

        let emit = match state {
            DedupState::Quiet => true,
            DedupState::Alerted {
                severity,
                last_emitted_at,
            } => score.severity > severity || now - last_emitted_at >= self.cooldown,
        };

        if emit {
            inner.states.insert(
                score.status,
                DedupState::Alerted {
                    severity: score.severity,
                    last_emitted_at: now,
                },
            );
        }

        let record = AlertRecord {
            status: score.status,
            severity: score.severity,
            message: alert_message(score.status, ctx.rate, ctx.window_count),
            score: score.total,
            rate: ctx.rate,
            threshold: ctx.threshold,
            z_score: ctx.z_score,
            timestamp: now,
            emitted: emit,
        };

        if inner.history.len() >= self.history_size {
            inner.history.pop_front();
        }
        inner.history.push_back(record.clone());

        AlertDecision {
            emit,
            record: Some(record),
        }
    }

    pub fn state(&self, status: TransactionStatus) -> DedupState {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .states
            .get(&status)
            .copied()
            .unwrap_or(DedupState::Quiet)
    }

    /// Most recent records first
    pub fn recent(&self, limit: usize) -> Vec<AlertRecord> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.history.iter().rev().take(limit).cloned().collect()
    }

    /// All records in chronological order
    pub fn history(&self) -> Vec<AlertRecord> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.history.iter().cloned().collect()
    }

    /// Preload history, e.g. from the durable store on startup.
    ///
    /// Dedup state is not restored; only the record list.
    pub fn restore_history(&self, records: impl IntoIterator<Item = AlertRecord>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            if inner.history.len() >= self.history_size {
                inner.history.pop_front();
            }
            inner.history.push_back(record);
        }
    }

    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        Self::new(
            TimeDelta::seconds(DEFAULT_COOLDOWN_SECS),
            DEFAULT_HISTORY_SIZE,
        )
    }
}

/// Human-readable alert text, e.g. `FAILED transactions at 6.78% (count: 8)`
pub fn alert_message(status: TransactionStatus, rate: f64, count: u64) -> String {
    format!(
        "{} transactions at {:.2}% (count: {})",
        status.as_str().to_uppercase(),
        rate,
        count
    )
}
