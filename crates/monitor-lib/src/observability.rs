//! Observability for the transaction monitor
//!
//! Provides:
//! - Prometheus metrics (ingest latency, alert volume, baseline freshness, store size)
//! - Event-tagged structured logging with tracing

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::models::{AlertRecord, Severity};

/// Histogram buckets for ingest latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05,
];

static GLOBAL_METRICS: OnceLock<Option<MetricsInner>> = OnceLock::new();

struct MetricsInner {
    ingest_latency_seconds: Histogram,
    observations_ingested: IntCounterVec,
    validation_rejections: IntCounter,
    alerts_emitted: IntCounterVec,
    alerts_suppressed: IntCounterVec,
    baseline_refreshes: IntCounter,
    baseline_refresh_failures: IntCounter,
    baseline_last_refresh_timestamp: IntGauge,
    store_entries: IntGauge,
    handoff_dropped: IntCounterVec,
}

/// Register with the default registry; a duplicate only skips exposition
fn registered<C>(collector: C) -> C
where
    C: prometheus::core::Collector + Clone + 'static,
{
    if let Err(e) = prometheus::register(Box::new(collector.clone())) {
        warn!(error = %e, "Failed to register metric");
    }
    collector
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> prometheus::Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels).map(registered)
}

impl MetricsInner {
    fn new() -> prometheus::Result<Self> {
        Ok(Self {
            ingest_latency_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "txmon_ingest_latency_seconds",
                    "Time spent recording and evaluating one observation",
                )
                .buckets(LATENCY_BUCKETS.to_vec()),
            )
            .map(registered)?,
            observations_ingested: counter_vec(
                "txmon_observations_ingested_total",
                "Observations accepted into the store",
                &["status"],
            )?,
            validation_rejections: IntCounter::new(
                "txmon_validation_rejections_total",
                "Observations rejected at ingestion",
            )
            .map(registered)?,
            alerts_emitted: counter_vec(
                "txmon_alerts_emitted_total",
                "Alerts handed to the notification dispatcher",
                &["severity", "status"],
            )?,
            alerts_suppressed: counter_vec(
                "txmon_alerts_suppressed_total",
                "Alerts recorded but suppressed by the cool-down",
                &["severity", "status"],
            )?,
            baseline_refreshes: IntCounter::new(
                "txmon_baseline_refreshes_total",
                "Completed baseline refreshes",
            )
            .map(registered)?,
            baseline_refresh_failures: IntCounter::new(
                "txmon_baseline_refresh_failures_total",
                "Baseline refreshes skipped because history was unavailable",
            )
            .map(registered)?,
            baseline_last_refresh_timestamp: IntGauge::new(
                "txmon_baseline_last_refresh_timestamp_seconds",
                "Unix time of the last completed baseline refresh",
            )
            .map(registered)?,
            store_entries: IntGauge::new(
                "txmon_store_entries",
                "Observations currently held in the ring buffer",
            )
            .map(registered)?,
            handoff_dropped: counter_vec(
                "txmon_handoff_dropped_total",
                "Items dropped because a background queue was full",
                &["channel"],
            )?,
        })
    }

    fn init() -> Option<Self> {
        match Self::new() {
            Ok(inner) => Some(inner),
            Err(e) => {
                warn!(error = %e, "Metrics disabled, failed to build collectors");
                None
            }
        }
    }
}

/// Handle to the process-wide monitor metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MetricsInner::init);
        Self { _private: () }
    }

    fn inner(&self) -> Option<&MetricsInner> {
        GLOBAL_METRICS.get_or_init(MetricsInner::init).as_ref()
    }

    pub fn observe_ingest_latency(&self, duration_secs: f64) {
        if let Some(m) = self.inner() {
            m.ingest_latency_seconds.observe(duration_secs);
        }
    }

    pub fn inc_observations_ingested(&self, status: &str) {
        if let Some(m) = self.inner() {
            m.observations_ingested.with_label_values(&[status]).inc();
        }
    }

    pub fn inc_validation_rejections(&self) {
        if let Some(m) = self.inner() {
            m.validation_rejections.inc();
        }
    }

    /// Count an alert record as emitted or suppressed
    pub fn record_alert(&self, record: &AlertRecord) {
        let Some(m) = self.inner() else { return };
        let labels = [record.severity.as_str(), record.status.as_str()];
        if record.emitted {
            m.alerts_emitted.with_label_values(&labels).inc();
        } else {
            m.alerts_suppressed.with_label_values(&labels).inc();
        }
    }

    pub fn record_baseline_refresh(&self, refreshed_at_unix: i64) {
        if let Some(m) = self.inner() {
            m.baseline_refreshes.inc();
            m.baseline_last_refresh_timestamp.set(refreshed_at_unix);
        }
    }

    pub fn inc_baseline_refresh_failures(&self) {
        if let Some(m) = self.inner() {
            m.baseline_refresh_failures.inc();
        }
    }

    pub fn set_store_entries(&self, entries: usize) {
        if let Some(m) = self.inner() {
            m.store_entries
                .set(i64::try_from(entries).unwrap_or(i64::MAX));
        }
    }

    pub fn inc_handoff_dropped(&self, channel: &str) {
        if let Some(m) = self.inner() {
            m.handoff_dropped.with_label_values(&[channel]).inc();
        }
    }
}

/// Render every registered metric in the Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Structured logger for monitor events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_alert(&self, record: &AlertRecord) {
        if !record.emitted {
            debug!(
                event = "alert_suppressed",
                instance = %self.instance,
                status = %record.status,
                severity = %record.severity,
                score = record.score,
                rate = record.rate,
                "Alert suppressed within cool-down"
            );
            return;
        }

        match record.severity {
            Severity::Critical => warn!(
                event = "alert_emitted",
                instance = %self.instance,
                status = %record.status,
                severity = %record.severity,
                score = record.score,
                rate = record.rate,
                threshold = record.threshold,
                z_score = ?record.z_score,
                message = %record.message,
                "Critical transaction anomaly"
            ),
            _ => info!(
                event = "alert_emitted",
                instance = %self.instance,
                status = %record.status,
                severity = %record.severity,
                score = record.score,
                rate = record.rate,
                threshold = record.threshold,
                z_score = ?record.z_score,
                message = %record.message,
                "Transaction anomaly"
            ),
        }
    }

    pub fn log_baseline_refreshed(&self, statuses: usize, defined: usize, buckets: usize) {
        info!(
            event = "baseline_refreshed",
            instance = %self.instance,
            statuses = statuses,
            defined_statuses = defined,
            minute_buckets = buckets,
            "Baseline refreshed"
        );
    }

    pub fn log_baseline_refresh_skipped(&self, reason: &str) {
        warn!(
            event = "baseline_refresh_skipped",
            instance = %self.instance,
            reason = %reason,
            "Baseline refresh skipped, keeping last snapshot"
        );
    }

    pub fn log_startup(&self, version: &str, observations: usize, baseline_loaded: bool) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            observations = observations,
            baseline_loaded = baseline_loaded,
            "Transaction monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Transaction monitor shutting down"
        );
    }
}
