//! Outbound alert notification
//!
//! The engine hands every emitted alert to an [`AlertDispatcher`] without
//! waiting. A [`DispatchWorker`] delivers each message to all configured
//! sinks; routing to chat, paging or email is a sink concern.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::error::MonitorError;
use crate::health::{components, HealthRegistry};
use crate::models::{AlertMessage, Severity};
use crate::observability::MonitorMetrics;

/// Default queue depth between the engine and the dispatcher
pub const DEFAULT_DISPATCH_QUEUE: usize = 256;

/// A destination for alert notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, message: &AlertMessage) -> Result<(), MonitorError>;
}

/// Writes notifications to the tracing output
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, message: &AlertMessage) -> Result<(), MonitorError> {
        match message.severity {
            Severity::Critical => warn!(
                event = "notification",
                status = %message.status,
                severity = %message.severity,
                score = message.score,
                "{}", message.message
            ),
            _ => info!(
                event = "notification",
                status = %message.status,
                severity = %message.severity,
                score = message.score,
                "{}", message.message
            ),
        }
        Ok(())
    }
}

/// Appends notifications as JSON lines to a file, e.g. for a log shipper
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NotificationSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn deliver(&self, message: &AlertMessage) -> Result<(), MonitorError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Cloneable sending side used by the engine
#[derive(Clone)]
pub struct AlertDispatcher {
    tx: mpsc::Sender<AlertMessage>,
    metrics: MonitorMetrics,
}

impl AlertDispatcher {
    /// Queue a notification without waiting; returns false if it was dropped
    pub fn dispatch(&self, message: AlertMessage) -> bool {
        let status = message.status;
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(e) => {
                warn!(%status, error = %e, "Notification queue rejected alert");
                self.metrics.inc_handoff_dropped("notification");
                false
            }
        }
    }
}

/// Background task fanning alerts out to sinks
pub struct DispatchWorker {
    sinks: Vec<Arc<dyn NotificationSink>>,
    rx: mpsc::Receiver<AlertMessage>,
    health: Option<HealthRegistry>,
}

impl DispatchWorker {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>, queue_size: usize) -> (AlertDispatcher, Self) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let dispatcher = AlertDispatcher {
            tx,
            metrics: MonitorMetrics::new(),
        };
        (
            dispatcher,
            Self {
                sinks,
                rx,
                health: None,
            },
        )
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(sinks = self.sinks.len(), "Starting alert dispatcher");

        loop {
            tokio::select! {
                message = self.rx.recv() => {
                    match message {
                        Some(message) => self.deliver(&message).await,
                        None => break,
                    }
                }
                _ = shutdown.recv() => {
                    self.rx.close();
                    while let Some(message) = self.rx.recv().await {
                        self.deliver(&message).await;
                    }
                    info!("Shutting down alert dispatcher");
                    break;
                }
            }
        }
    }

    async fn deliver(&self, message: &AlertMessage) {
        let mut failures = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(message).await {
                warn!(sink = sink.name(), status = %message.status, error = %e, "Sink delivery failed");
                failures.push(format!("{}: {}", sink.name(), e));
            }
        }

        if let Some(health) = &self.health {
            if failures.is_empty() {
                health.record_success(components::DISPATCHER).await;
            } else {
                health
                    .record_failure(components::DISPATCHER, failures.join("; "))
                    .await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionStatus;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        received: Mutex<Vec<AlertMessage>>,
    }

    #[async_trait]
    impl NotificationSink for CollectingSink {
        fn name(&self) -> &str {
            "collect"
        }

        async fn deliver(&self, message: &AlertMessage) -> Result<(), MonitorError> {
            self.received.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _message: &AlertMessage) -> Result<(), MonitorError> {
            Err(MonitorError::StoreUnavailable("pager offline".to_string()))
        }
    }

    fn message() -> AlertMessage {
        AlertMessage {
            status: TransactionStatus::Failed,
            severity: Severity::Critical,
            message: "FAILED transactions at 6.78% (count: 8)".to_string(),
            score: 90,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fan_out_and_flush_on_shutdown() {
        let sink = Arc::new(CollectingSink::default());
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![sink.clone() as Arc<dyn NotificationSink>, Arc::new(LogSink)];
        let (dispatcher, worker) = DispatchWorker::new(sinks, 8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        assert!(dispatcher.dispatch(message()));
        assert!(dispatcher.dispatch(message()));

        let handle = tokio::spawn(worker.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(sink.received.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (dispatcher, _worker) = DispatchWorker::new(vec![], 1);

        assert!(dispatcher.dispatch(message()));
        assert!(!dispatcher.dispatch(message()));
    }

    #[tokio::test]
    async fn test_sink_failure_degrades_health() {
        let health = HealthRegistry::new();
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(FailingSink) as Arc<dyn NotificationSink>];
        let (dispatcher, worker) = DispatchWorker::new(sinks, 4);
        let worker = worker.with_health(health.clone());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        dispatcher.dispatch(message());
        let handle = tokio::spawn(worker.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        let component = health.component(components::DISPATCHER).await.unwrap();
        assert_eq!(component.status, crate::health::ComponentStatus::Degraded);
    }

    #[tokio::test]
    async fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let sink = JsonLinesSink::new(&path);

        sink.deliver(&message()).await.unwrap();
        sink.deliver(&message()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
        let parsed: AlertMessage = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.score, 90);
    }
}
