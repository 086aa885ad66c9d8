//! Anomaly detection engine
//!
//! One [`DetectionEngine`] is shared behind an `Arc` by every ingestion
//! caller. Each ingest records the observation, recomputes the trailing
//! window at the observation's own timestamp, scores every monitored status
//! against the last published baseline and runs the result through the
//! deduplicator. A window holding fewer than `min_window_observations`
//! observations scores 0. Persistence and notification are queued, never
//! awaited.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::debug;

use crate::aggregator::WindowAggregator;
use crate::anomaly::{
    classify, AlertContext, AlertDeduplicator, RuleEvaluator, StatisticalEvaluator,
};
use crate::baseline::{BaselineModel, BaselineSnapshot};
use crate::config::DetectorConfig;
use crate::error::MonitorError;
use crate::models::{
    AlertMessage, AlertRecord, AnomalyScore, BaselineStat, Observation, Severity,
    TransactionStatus, WindowMetric,
};
use crate::notify::AlertDispatcher;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::reporting::{summarize_alerts, AlertSummaryRow};
use crate::store::{ObservationStore, PersistCommand, PersistenceHandle};

/// Score of one status in one evaluation, with the inputs that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub score: AnomalyScore,
    pub rate: f64,
    pub window_count: u64,
    pub total_count: u64,
    /// Rule threshold behind the rule component, 0 when it did not fire
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
}

/// Result of one [`DetectionEngine::ingest`] call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    /// Minute the observation was recorded under
    pub timestamp: DateTime<Utc>,
    /// Highest total across evaluated statuses
    pub anomaly_score: u32,
    pub severity: Severity,
    /// Alert records from this evaluation, suppressed ones included
    pub alerts: Vec<AlertRecord>,
    /// True when at least one alert was emitted
    pub should_alert: bool,
    pub evaluations: Vec<Evaluation>,
}

pub struct DetectionEngine {
    config: DetectorConfig,
    store: Arc<ObservationStore>,
    aggregator: WindowAggregator,
    baseline: BaselineModel,
    rules: RuleEvaluator,
    statistical: StatisticalEvaluator,
    dedup: AlertDeduplicator,
    monitored: Vec<TransactionStatus>,
    persistence: Option<PersistenceHandle>,
    dispatcher: Option<AlertDispatcher>,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl DetectionEngine {
    pub fn new(config: DetectorConfig) -> Result<Self, MonitorError> {
        config.validate()?;

        let store = Arc::new(ObservationStore::from_config(&config));
        let rules = RuleEvaluator::new(config.rule_table());
        let statistical = StatisticalEvaluator::new(config.sigma_warning, config.sigma_critical)
            .with_symmetric(config.symmetric_statuses.iter().copied());

        let mut monitored = rules.monitored_statuses();
        for status in &config.symmetric_statuses {
            if !monitored.contains(status) {
                monitored.push(*status);
            }
        }
        monitored.sort();

        Ok(Self {
            aggregator: WindowAggregator::new(Arc::clone(&store)),
            baseline: BaselineModel::from_config(&config),
            dedup: AlertDeduplicator::new(config.cooldown(), config.alert_history_size),
            store,
            rules,
            statistical,
            monitored,
            persistence: None,
            dispatcher: None,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("txmon"),
            config,
        })
    }

    pub fn with_persistence(mut self, handle: PersistenceHandle) -> Self {
        self.persistence = Some(handle);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: AlertDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Validate raw transport fields, then record and evaluate.
    ///
    /// Only validation errors are returned; evaluation always yields a score.
    pub fn ingest(
        &self,
        timestamp: &str,
        status: &str,
        count: i64,
    ) -> Result<IngestOutcome, MonitorError> {
        let observation = Observation::parse(timestamp, status, count).map_err(|e| {
            self.metrics.inc_validation_rejections();
            e
        })?;
        Ok(self.ingest_observation(observation))
    }

    pub fn ingest_observation(&self, observation: Observation) -> IngestOutcome {
        let start = Instant::now();

        self.store.record(observation);
        self.metrics
            .inc_observations_ingested(observation.status.as_str());
        self.metrics.set_store_entries(self.store.len());
        self.persist(PersistCommand::Observation(observation));

        let outcome = self.evaluate_at(observation.timestamp);
        self.metrics
            .observe_ingest_latency(start.elapsed().as_secs_f64());
        outcome
    }

    /// Score the window ending at `now` and run alerts through dedup
    fn evaluate_at(&self, now: DateTime<Utc>) -> IngestOutcome {
        let window_minutes = self.config.window_minutes;
        let (observed, window) = self.aggregator.observed_metrics(window_minutes, now);
        let baseline = self.baseline.snapshot();

        let sufficient = observed >= self.config.min_window_observations;
        if !sufficient {
            debug!(
                observed,
                required = self.config.min_window_observations,
                "Too few observations in window, scoring as empty"
            );
        }

        let evaluations: Vec<Evaluation> = self
            .monitored
            .iter()
            .filter_map(|status| window.get(status))
            .map(|metric| {
                if sufficient {
                    self.score(metric, baseline.get(metric.status))
                } else {
                    let empty = WindowMetric::new(metric.status, 0, 0, window_minutes);
                    self.score(&empty, None)
                }
            })
            .collect();

        let mut alerts = Vec::new();
        for evaluation in &evaluations {
            let ctx = AlertContext {
                rate: evaluation.rate,
                window_count: evaluation.window_count,
                threshold: evaluation.threshold,
                z_score: evaluation.z_score,
            };
            let decision = self.dedup.consider(&evaluation.score, &ctx, now);
            let Some(record) = decision.record else {
                continue;
            };

            self.metrics.record_alert(&record);
            self.logger.log_alert(&record);
            self.persist(PersistCommand::Alert(record.clone()));
            if decision.emit {
                if let Some(dispatcher) = &self.dispatcher {
                    dispatcher.dispatch(AlertMessage::from(&record));
                }
            }
            alerts.push(record);
        }

        let top = evaluations.iter().map(|e| &e.score).max_by_key(|s| s.total);
        IngestOutcome {
            timestamp: now,
            anomaly_score: top.map(|s| s.total).unwrap_or(0),
            severity: top.map(|s| s.severity).unwrap_or(Severity::Info),
            should_alert: alerts.iter().any(|a| a.emitted),
            alerts,
            evaluations,
        }
    }

    /// Score one window metric against a baseline.
    ///
    /// Pure: the same inputs always give the same result. An empty window
    /// scores 0 on both components.
    pub fn score(&self, metric: &WindowMetric, baseline: Option<&BaselineStat>) -> Evaluation {
        if metric.is_empty() {
            return Evaluation {
                score: classify(metric.status, 0, 0),
                rate: 0.0,
                window_count: 0,
                total_count: 0,
                threshold: 0.0,
                z_score: None,
            };
        }

        let rule_component = self.rules.evaluate(metric.status, metric.rate);
        let statistical = self.statistical.assess(metric.rate, baseline);

        Evaluation {
            score: classify(metric.status, rule_component, statistical.component),
            rate: metric.rate,
            window_count: metric.window_count,
            total_count: metric.total_count,
            threshold: self.rules.threshold_for(metric.status, rule_component),
            z_score: statistical.z_score,
        }
    }

    /// Recompute the baseline from `history` and publish it
    pub fn refresh_baseline(
        &self,
        history: &[Observation],
        as_of: DateTime<Utc>,
    ) -> Arc<BaselineSnapshot> {
        let snapshot = self.baseline.refresh(history, as_of);
        self.metrics
            .record_baseline_refresh(snapshot.refreshed_at.timestamp());
        self.logger.log_baseline_refreshed(
            snapshot.stats.len(),
            snapshot.defined_count(),
            snapshot.minute_buckets,
        );
        self.persist(PersistCommand::Baseline(Arc::clone(&snapshot)));
        snapshot
    }

    /// Publish a baseline restored from the durable store
    pub fn install_baseline(&self, snapshot: BaselineSnapshot) {
        self.baseline.install(Arc::new(snapshot));
    }

    /// Seed the ring buffer without evaluating or persisting
    pub fn seed(&self, observations: impl IntoIterator<Item = Observation>) -> usize {
        let recorded = self.store.record_batch(observations);
        self.metrics.set_store_entries(self.store.len());
        recorded
    }

    pub fn restore_alerts(&self, records: impl IntoIterator<Item = AlertRecord>) {
        self.dedup.restore_history(records);
    }

    /// Reference time for reporting: newest observation, else wall clock
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.store.latest_timestamp().unwrap_or_else(Utc::now)
    }

    /// Current window metrics for every status
    pub fn window_metrics(&self, window_minutes: u32) -> BTreeMap<TransactionStatus, WindowMetric> {
        self.aggregator
            .metrics(window_minutes, self.reference_time())
    }

    pub fn baseline_snapshot(&self) -> Arc<BaselineSnapshot> {
        self.baseline.snapshot()
    }

    pub fn baseline_loaded(&self) -> bool {
        self.baseline.is_loaded()
    }

    pub fn recent_alerts(&self, limit: usize) -> Vec<AlertRecord> {
        self.dedup.recent(limit)
    }

    /// Alert summary over the last `minutes`
    pub fn alert_summary(&self, minutes: u32) -> Vec<AlertSummaryRow> {
        let since = self.reference_time() - TimeDelta::minutes(i64::from(minutes));
        summarize_alerts(&self.dedup.history(), since)
    }

    pub fn store(&self) -> &Arc<ObservationStore> {
        &self.store
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn monitored_statuses(&self) -> &[TransactionStatus] {
        &self.monitored
    }

    fn persist(&self, command: PersistCommand) {
        if let Some(handle) = &self.persistence {
            handle.submit(command);
        }
    }
}
