//! Bounded in-memory observation store
//!
//! Ring buffer holding the most recent per-minute counts:
//! - FIFO eviction once capacity is reached
//! - Retention horizon measured against the newest timestamp seen
//! - One mutex around the buffer so every read sees a consistent snapshot

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use crate::config::DetectorConfig;
use crate::error::MonitorError;
use crate::models::Observation;

/// Default maximum number of observations held in memory
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default retention horizon (72 hours of minute data)
pub const DEFAULT_RETENTION_HOURS: i64 = 72;

struct Inner {
    buffer: VecDeque<Observation>,
    newest: Option<DateTime<Utc>>,
    evicted: u64,
}

/// Ring buffer of recent observations, shared between ingestion and readers
pub struct ObservationStore {
    inner: Mutex<Inner>,
    capacity: usize,
    retention: TimeDelta,
}

impl ObservationStore {
    /// Create a store with the given capacity and retention horizon
    pub fn new(capacity: usize, retention: TimeDelta) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
                newest: None,
                evicted: 0,
            }),
            capacity: capacity.max(1),
            retention,
        }
    }

    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(config.store_capacity, config.retention())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an observation, evicting whatever falls out of capacity or retention
    pub fn record(&self, observation: Observation) {
        let mut inner = self.lock();

        let newest = match inner.newest {
            Some(ts) if ts >= observation.timestamp => ts,
            _ => observation.timestamp,
        };
        inner.newest = Some(newest);

        let cutoff = newest - self.retention;
        if observation.timestamp < cutoff {
            inner.evicted += 1;
            return;
        }

        while inner.buffer.len() >= self.capacity {
            inner.buffer.pop_front();
            inner.evicted += 1;
        }

        while let Some(front) = inner.buffer.front() {
            if front.timestamp < cutoff {
                inner.buffer.pop_front();
                inner.evicted += 1;
            } else {
                break;
            }
        }

        inner.buffer.push_back(observation);
    }

    /// Validate raw fields and record the resulting observation
    pub fn record_raw(
        &self,
        timestamp: &str,
        status: &str,
        count: i64,
    ) -> Result<Observation, MonitorError> {
        let observation = Observation::parse(timestamp, status, count)?;
        self.record(observation);
        Ok(observation)
    }

    /// Record many observations, e.g. when seeding from history
    pub fn record_batch(&self, observations: impl IntoIterator<Item = Observation>) -> usize {
        let mut recorded = 0;
        for observation in observations {
            self.record(observation);
            recorded += 1;
        }
        debug!(recorded, retained = self.len(), "Seeded observation store");
        recorded
    }

    /// Observations with timestamp in `[now - window_minutes, now]`
    pub fn query(&self, window_minutes: u32, now: DateTime<Utc>) -> Vec<Observation> {
        let start = now - TimeDelta::minutes(i64::from(window_minutes));
        self.lock()
            .buffer
            .iter()
            .filter(|o| o.timestamp >= start && o.timestamp <= now)
            .copied()
            .collect()
    }

    /// Copy of everything currently retained
    pub fn snapshot(&self) -> Vec<Observation> {
        self.lock().buffer.iter().copied().collect()
    }

    /// Newest observation timestamp seen so far (the event-time clock)
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.lock().newest
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.lock();
        let oldest = inner.buffer.iter().map(|o| o.timestamp).min();
        StoreStats {
            entries: inner.buffer.len(),
            capacity: self.capacity,
            evicted: inner.evicted,
            oldest_timestamp: oldest,
            newest_timestamp: inner.newest,
            retention_seconds: self.retention.num_seconds(),
        }
    }
}

impl Default for ObservationStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, TimeDelta::hours(DEFAULT_RETENTION_HOURS))
    }
}

/// Store statistics
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub entries: usize,
    pub capacity: usize,
    /// Observations dropped by capacity or retention since startup
    pub evicted: u64,
    pub oldest_timestamp: Option<DateTime<Utc>>,
    pub newest_timestamp: Option<DateTime<Utc>>,
    pub retention_seconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionStatus;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 12, 12, 0, 0).unwrap() + TimeDelta::minutes(minute)
    }

    fn obs(minute: i64, status: TransactionStatus, count: u64) -> Observation {
        Observation::new(at(minute), status, count)
    }

    #[test]
    fn test_record_and_query_window() {
        let store = ObservationStore::default();
        for m in 0..30 {
            store.record(obs(m, TransactionStatus::Approved, 10));
        }

        // [now - 15, now] is inclusive on both ends
        let window = store.query(15, at(29));
        assert_eq!(window.len(), 16);
        assert!(window.iter().all(|o| o.timestamp >= at(14)));
    }

    #[test]
    fn test_capacity_limit_evicts_oldest() {
        let store = ObservationStore::new(5, TimeDelta::hours(1));
        for m in 0..10 {
            store.record(obs(m, TransactionStatus::Failed, m as u64));
        }

        assert_eq!(store.len(), 5);
        let snapshot = store.snapshot();
        assert_eq!(snapshot[0].count, 5);
        assert_eq!(snapshot[4].count, 9);
        assert_eq!(store.stats().evicted, 5);
    }

    #[test]
    fn test_retention_eviction() {
        let store = ObservationStore::new(1000, TimeDelta::minutes(60));
        for m in 0..120 {
            store.record(obs(m, TransactionStatus::Approved, 1));
        }

        // Only the last hour (inclusive) survives
        assert_eq!(store.len(), 61);
        assert_eq!(store.stats().oldest_timestamp, Some(at(59)));
    }

    #[test]
    fn test_stale_observation_dropped_silently() {
        let store = ObservationStore::new(1000, TimeDelta::minutes(60));
        store.record(obs(120, TransactionStatus::Approved, 1));
        store.record(obs(0, TransactionStatus::Approved, 1));

        assert_eq!(store.len(), 1);
        assert_eq!(store.latest_timestamp(), Some(at(120)));
    }

    #[test]
    fn test_record_raw_validation() {
        let store = ObservationStore::default();
        assert!(store.record_raw("2025-07-12 12:00:00", "failed", -3).is_err());
        assert!(store.record_raw("2025-07-12 12:00:00", "lost", 3).is_err());
        assert!(store.is_empty());

        let recorded = store.record_raw("2025-07-12 12:00:00", "failed", 3).unwrap();
        assert_eq!(recorded.status, TransactionStatus::Failed);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_writers_and_readers() {
        let store = Arc::new(ObservationStore::default());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for m in 0..100 {
                        store.record(obs(m, TransactionStatus::Approved, t));
                        let _ = store.query(15, at(m));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 400);
    }

    #[test]
    fn test_stats() {
        let store = ObservationStore::new(100, TimeDelta::hours(1));
        for m in 0..5 {
            store.record(obs(m, TransactionStatus::Denied, 2));
        }

        let stats = store.stats();
        assert_eq!(stats.entries, 5);
        assert_eq!(stats.capacity, 100);
        assert_eq!(stats.oldest_timestamp, Some(at(0)));
        assert_eq!(stats.newest_timestamp, Some(at(4)));
        assert_eq!(stats.retention_seconds, 3600);
    }
}
