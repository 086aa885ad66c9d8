//! Windowed rate aggregation
//!
//! The rate formula lives here once and is shared by live evaluation and the
//! baseline model: a status's share of all transactions, as a percentage.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{rate_percent, Observation, TransactionStatus, WindowMetric};
use crate::store::ObservationStore;

/// Per-status counts for a set of observations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    counts: [u64; TransactionStatus::COUNT],
}

impl StatusCounts {
    pub fn add(&mut self, status: TransactionStatus, count: u64) {
        self.counts[status.index()] = self.counts[status.index()].saturating_add(count);
    }

    pub fn count(&self, status: TransactionStatus) -> u64 {
        self.counts[status.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().fold(0u64, |acc, c| acc.saturating_add(*c))
    }

    pub fn rate(&self, status: TransactionStatus) -> f64 {
        rate_percent(self.count(status), self.total())
    }

    pub fn from_observations<'a>(observations: impl IntoIterator<Item = &'a Observation>) -> Self {
        let mut counts = Self::default();
        for obs in observations {
            counts.add(obs.status, obs.count);
        }
        counts
    }
}

/// Group observations into minute buckets, oldest first
pub fn minute_buckets<'a>(
    observations: impl IntoIterator<Item = &'a Observation>,
) -> BTreeMap<DateTime<Utc>, StatusCounts> {
    let mut buckets: BTreeMap<DateTime<Utc>, StatusCounts> = BTreeMap::new();
    for obs in observations {
        buckets
            .entry(obs.timestamp)
            .or_default()
            .add(obs.status, obs.count);
    }
    buckets
}

/// Per-minute rates for every status, oldest first.
///
/// Minutes with no transactions at all are skipped; a status missing from a
/// minute that has traffic contributes a rate of 0.
pub fn minute_rates<'a>(
    observations: impl IntoIterator<Item = &'a Observation>,
) -> BTreeMap<TransactionStatus, Vec<f64>> {
    let buckets = minute_buckets(observations);
    let mut rates: BTreeMap<TransactionStatus, Vec<f64>> = TransactionStatus::ALL
        .into_iter()
        .map(|status| (status, Vec::with_capacity(buckets.len())))
        .collect();

    for counts in buckets.values().filter(|c| c.total() > 0) {
        for (status, series) in rates.iter_mut() {
            series.push(counts.rate(*status));
        }
    }
    rates
}

/// Window metrics for every status from an already-filtered slice
pub fn window_metrics(
    observations: &[Observation],
    window_minutes: u32,
) -> BTreeMap<TransactionStatus, WindowMetric> {
    let counts = StatusCounts::from_observations(observations);
    let total = counts.total();
    TransactionStatus::ALL
        .into_iter()
        .map(|status| {
            (
                status,
                WindowMetric::new(status, counts.count(status), total, window_minutes),
            )
        })
        .collect()
}

/// Computes trailing-window metrics from the observation store
#[derive(Clone)]
pub struct WindowAggregator {
    store: Arc<ObservationStore>,
}

impl WindowAggregator {
    pub fn new(store: Arc<ObservationStore>) -> Self {
        Self { store }
    }

    /// Metrics for every status over `[now - window_minutes, now]`
    pub fn metrics(
        &self,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> BTreeMap<TransactionStatus, WindowMetric> {
        self.observed_metrics(window_minutes, now).1
    }

    /// Like [`metrics`](Self::metrics), also returning how many observations
    /// fell inside the window
    pub fn observed_metrics(
        &self,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> (usize, BTreeMap<TransactionStatus, WindowMetric>) {
        let window = self.store.query(window_minutes, now);
        (window.len(), window_metrics(&window, window_minutes))
    }
}
