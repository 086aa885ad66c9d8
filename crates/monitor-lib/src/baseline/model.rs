//! Historical rate statistics per status
//!
//! Snapshots are immutable. A refresh computes a new snapshot without holding
//! the lock and then swaps the `Arc`, so readers always see either the old or
//! the new baseline in full.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::minute_rates;
use crate::config::DetectorConfig;
use crate::models::{BaselineStat, Observation, TransactionStatus};

/// Minimum minute buckets before a stddev is considered meaningful
pub const DEFAULT_MIN_SAMPLES: usize = 30;

/// One fully computed baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSnapshot {
    pub refreshed_at: DateTime<Utc>,
    /// Reference time of the history the snapshot was computed from
    pub as_of: DateTime<Utc>,
    pub minute_buckets: usize,
    pub stats: BTreeMap<TransactionStatus, BaselineStat>,
}

impl BaselineSnapshot {
    /// Snapshot with no statistics; every status is unassessable
    pub fn empty() -> Self {
        Self {
            refreshed_at: DateTime::<Utc>::default(),
            as_of: DateTime::<Utc>::default(),
            minute_buckets: 0,
            stats: BTreeMap::new(),
        }
    }

    pub fn get(&self, status: TransactionStatus) -> Option<&BaselineStat> {
        self.stats.get(&status)
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Statuses whose stddev is defined
    pub fn defined_count(&self) -> usize {
        self.stats
            .values()
            .filter(|s| s.stddev_rate.is_some())
            .count()
    }
}

/// Parameters of the baseline computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineSettings {
    /// How far back history is considered
    pub horizon: TimeDelta,
    /// Trailing period excluded so the live window never feeds its own baseline
    pub exclude_recent: TimeDelta,
    pub min_samples: usize,
}

impl BaselineSettings {
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self {
            horizon: config.baseline_horizon(),
            exclude_recent: config.window(),
            min_samples: config.baseline_min_samples,
        }
    }
}

impl Default for BaselineSettings {
    fn default() -> Self {
        Self {
            horizon: TimeDelta::hours(72),
            exclude_recent: TimeDelta::minutes(15),
            min_samples: DEFAULT_MIN_SAMPLES,
        }
    }
}

/// Mean and sample standard deviation (Bessel-corrected).
///
/// A constant series reports exactly 0 even when summing its values
/// leaves rounding residue in the mean.
pub(crate) fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    let Some(first) = values.first() else {
        return (0.0, 0.0);
    };
    if values.iter().all(|v| v == first) {
        return (*first, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}

/// Compute a snapshot from `history` over `[as_of - horizon, as_of - exclude_recent)`
pub fn compute_snapshot(
    history: &[Observation],
    as_of: DateTime<Utc>,
    settings: &BaselineSettings,
    refreshed_at: DateTime<Utc>,
) -> BaselineSnapshot {
    let start = as_of - settings.horizon;
    let end = as_of - settings.exclude_recent;

    let in_range = history
        .iter()
        .filter(|obs| obs.timestamp >= start && obs.timestamp < end);
    let rates = minute_rates(in_range);

    let minute_buckets = rates.values().map(Vec::len).max().unwrap_or(0);
    let stats = if minute_buckets == 0 {
        BTreeMap::new()
    } else {
        rates
            .into_iter()
            .map(|(status, series)| {
                let (mean, stddev) = mean_and_stddev(&series);
                let stat = BaselineStat {
                    status,
                    mean_rate: mean,
                    stddev_rate: (series.len() >= settings.min_samples).then_some(stddev),
                    sample_size: series.len(),
                    last_refreshed_at: refreshed_at,
                };
                (status, stat)
            })
            .collect()
    };

    BaselineSnapshot {
        refreshed_at,
        as_of,
        minute_buckets,
        stats,
    }
}

/// Owner of the current baseline snapshot
pub struct BaselineModel {
    settings: BaselineSettings,
    current: RwLock<Arc<BaselineSnapshot>>,
    loaded: AtomicBool,
}

impl BaselineModel {
    pub fn new(settings: BaselineSettings) -> Self {
        Self {
            settings,
            current: RwLock::new(Arc::new(BaselineSnapshot::empty())),
            loaded: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(BaselineSettings::from_config(config))
    }

    /// Recompute from `history` and publish the new snapshot
    pub fn refresh(&self, history: &[Observation], as_of: DateTime<Utc>) -> Arc<BaselineSnapshot> {
        let snapshot = Arc::new(compute_snapshot(
            history,
            as_of,
            &self.settings,
            Utc::now(),
        ));
        self.install(Arc::clone(&snapshot));
        snapshot
    }

    /// Publish a snapshot computed elsewhere, e.g. restored from disk
    pub fn install(&self, snapshot: Arc<BaselineSnapshot>) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
        self.loaded.store(true, Ordering::Release);
    }

    pub fn get(&self, status: TransactionStatus) -> Option<BaselineStat> {
        self.snapshot().get(status).cloned()
    }

    /// The last published snapshot
    pub fn snapshot(&self) -> Arc<BaselineSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether any snapshot has been published yet
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &BaselineSettings {
        &self.settings
    }
}

impl Default for BaselineModel {
    fn default() -> Self {
        Self::new(BaselineSettings::default())
    }
}
