//! Periodic baseline refresh
//!
//! Refresh is time-driven, never per observation. History comes from the
//! durable store when one is configured, otherwise from the in-memory ring
//! buffer. If the durable store is unreachable the cycle is skipped and the
//! previous snapshot stays in use. After a successful refresh the durable
//! history is compacted to the longer of the baseline horizon and the
//! in-memory retention.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::BaselineSnapshot;
use crate::engine::DetectionEngine;
use crate::error::MonitorError;
use crate::health::{components, HealthRegistry};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::store::DurableStore;

pub struct BaselineRefresher {
    engine: Arc<DetectionEngine>,
    durable: Option<Arc<dyn DurableStore>>,
    health: Option<HealthRegistry>,
    interval: Duration,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl BaselineRefresher {
    pub fn new(engine: Arc<DetectionEngine>) -> Self {
        let interval = engine.config().refresh_interval();
        Self {
            engine,
            durable: None,
            health: None,
            interval,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("txmon"),
        }
    }

    pub fn with_durable_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Load history and publish a new snapshot
    pub async fn refresh_once(&self) -> Result<Arc<BaselineSnapshot>, MonitorError> {
        let history = match &self.durable {
            Some(store) => {
                let since = self
                    .engine
                    .store()
                    .latest_timestamp()
                    .map(|ts| ts - self.engine.config().baseline_horizon());
                store.load_history(since).await?
            }
            None => self.engine.store().snapshot(),
        };

        let as_of = history
            .iter()
            .map(|o| o.timestamp)
            .max()
            .into_iter()
            .chain(self.engine.store().latest_timestamp())
            .max()
            .unwrap_or_else(Utc::now);

        debug!(observations = history.len(), %as_of, "Refreshing baseline");
        let snapshot = self.engine.refresh_baseline(&history, as_of);

        if let Some(store) = &self.durable {
            self.compact(store.as_ref(), as_of).await;
        }
        Ok(snapshot)
    }

    /// Trim durable history nothing will read again; failures only warn
    async fn compact(&self, store: &dyn DurableStore, as_of: DateTime<Utc>) {
        let config = self.engine.config();
        let keep = config.baseline_horizon().max(config.retention());
        match store.compact_history(as_of - keep).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Compacted durable observation history"),
            Err(e) => warn!(error = %e, "Failed to compact durable observation history"),
        }
    }

    /// One refresh cycle; failures are reported, never propagated
    pub async fn tick(&self) -> bool {
        match self.refresh_once().await {
            Ok(_) => {
                if let Some(health) = &self.health {
                    health.record_success(components::BASELINE).await;
                }
                true
            }
            Err(e) => {
                self.metrics.inc_baseline_refresh_failures();
                self.logger.log_baseline_refresh_skipped(&e.to_string());
                if let Some(health) = &self.health {
                    health
                        .set_degraded(components::BASELINE, format!("using stale baseline: {}", e))
                        .await;
                }
                false
            }
        }
    }

    /// Refresh every interval until shutdown.
    ///
    /// The first refresh happens one interval after start; bootstrap is
    /// expected to have refreshed already.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.interval.as_secs(), "Starting baseline refresher");

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down baseline refresher");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::health::ComponentStatus;
    use crate::models::{AlertRecord, Observation, TransactionStatus};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeDelta, TimeZone};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 12, 0, 0, 0).unwrap() + TimeDelta::minutes(minute)
    }

    fn seeded_engine(minutes: i64) -> Arc<DetectionEngine> {
        let engine = DetectionEngine::new(DetectorConfig::default()).unwrap();
        let observations = (0..minutes).flat_map(|m| {
            [
                Observation::new(at(m), TransactionStatus::Approved, 98),
                Observation::new(at(m), TransactionStatus::Denied, 2),
            ]
        });
        engine.seed(observations);
        Arc::new(engine)
    }

    struct UnreachableStore;

    #[async_trait]
    impl DurableStore for UnreachableStore {
        async fn load_history(
            &self,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<Observation>, MonitorError> {
            Err(MonitorError::StoreUnavailable("connection refused".to_string()))
        }

        async fn append_observation(&self, _o: &Observation) -> Result<(), MonitorError> {
            Ok(())
        }

        async fn append_alert(&self, _a: &AlertRecord) -> Result<(), MonitorError> {
            Ok(())
        }

        async fn save_baseline(&self, _s: &BaselineSnapshot) -> Result<(), MonitorError> {
            Ok(())
        }

        async fn load_baseline(&self) -> Result<Option<BaselineSnapshot>, MonitorError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_refresh_from_ring_buffer() {
        let engine = seeded_engine(90);
        let health = HealthRegistry::new();
        let refresher = BaselineRefresher::new(Arc::clone(&engine)).with_health(health.clone());

        assert!(refresher.tick().await);

        let snapshot = engine.baseline_snapshot();
        // as_of is minute 89; minutes 74..=89 fall inside the exclusion
        assert_eq!(snapshot.minute_buckets, 74);
        let denied = snapshot.get(TransactionStatus::Denied).unwrap();
        assert!((denied.mean_rate - 2.0).abs() < 1e-9);
        assert_eq!(
            health.component(components::BASELINE).await.unwrap().status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_keeps_previous_snapshot() {
        let engine = seeded_engine(90);
        BaselineRefresher::new(Arc::clone(&engine)).tick().await;
        let before = engine.baseline_snapshot();

        let health = HealthRegistry::new();
        let refresher = BaselineRefresher::new(Arc::clone(&engine))
            .with_durable_store(Arc::new(UnreachableStore))
            .with_health(health.clone());

        assert!(!refresher.tick().await);
        assert!(Arc::ptr_eq(&before, &engine.baseline_snapshot()));

        let component = health.component(components::BASELINE).await.unwrap();
        assert_eq!(component.status, ComponentStatus::Degraded);
        assert!(component.message.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_refresh_compacts_durable_history() {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(crate::store::JsonFileStore::open(dir.path()).await.unwrap());

        let config = DetectorConfig {
            baseline_horizon_hours: 1,
            retention_hours: 1,
            ..DetectorConfig::default()
        };
        let engine = DetectionEngine::new(config).unwrap();
        let observations: Vec<Observation> = (0..180)
            .map(|m| Observation::new(at(m), TransactionStatus::Approved, 100))
            .collect();
        for observation in &observations {
            durable.append_observation(observation).await.unwrap();
        }
        engine.seed(observations);

        let refresher = BaselineRefresher::new(Arc::new(engine))
            .with_durable_store(durable.clone() as Arc<dyn DurableStore>);
        assert!(refresher.tick().await);

        // minutes 119..=179 are still within the hour before as_of
        let remaining = durable.load_history(None).await.unwrap();
        assert_eq!(remaining.len(), 61);
        assert_eq!(remaining[0].timestamp, at(119));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let refresher = BaselineRefresher::new(seeded_engine(1))
            .with_interval(Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(refresher.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
