//! Fire-and-forget persistence handoff
//!
//! Ingestion never awaits the durable store. Records are queued on a bounded
//! channel and written by a background worker; a full channel drops the
//! record and counts it instead of stalling the caller.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::DurableStore;
use crate::baseline::BaselineSnapshot;
use crate::health::{components, HealthRegistry};
use crate::models::{AlertRecord, Observation};
use crate::observability::MonitorMetrics;

/// Default queue depth between ingestion and the writer
pub const DEFAULT_QUEUE_SIZE: usize = 4096;

/// Work item for the persistence worker
#[derive(Debug, Clone)]
pub enum PersistCommand {
    Observation(Observation),
    Alert(AlertRecord),
    Baseline(Arc<BaselineSnapshot>),
}

impl PersistCommand {
    fn kind(&self) -> &'static str {
        match self {
            PersistCommand::Observation(_) => "observation",
            PersistCommand::Alert(_) => "alert",
            PersistCommand::Baseline(_) => "baseline",
        }
    }
}

/// Cloneable sending side used by the engine
#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::Sender<PersistCommand>,
    metrics: MonitorMetrics,
}

impl PersistenceHandle {
    /// Queue a command without waiting; returns false if it was dropped
    pub fn submit(&self, command: PersistCommand) -> bool {
        let kind = command.kind();
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                warn!(kind, error = %e, "Persistence queue rejected record");
                self.metrics.inc_handoff_dropped("persistence");
                false
            }
        }
    }
}

/// Background writer draining the persistence queue
pub struct PersistenceWorker {
    store: Arc<dyn DurableStore>,
    rx: mpsc::Receiver<PersistCommand>,
    health: Option<HealthRegistry>,
}

impl PersistenceWorker {
    pub fn new(store: Arc<dyn DurableStore>, queue_size: usize) -> (PersistenceHandle, Self) {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let handle = PersistenceHandle {
            tx,
            metrics: MonitorMetrics::new(),
        };
        let worker = Self {
            store,
            rx,
            health: None,
        };
        (handle, worker)
    }

    /// Report write failures to the health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until shutdown, then flush whatever is still queued
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting persistence worker");

        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    match command {
                        Some(command) => self.write(command).await,
                        None => break,
                    }
                }
                _ = shutdown.recv() => {
                    self.rx.close();
                    let mut flushed = 0usize;
                    while let Some(command) = self.rx.recv().await {
                        self.write(command).await;
                        flushed += 1;
                    }
                    info!(flushed, "Shutting down persistence worker");
                    break;
                }
            }
        }
    }

    async fn write(&self, command: PersistCommand) {
        let kind = command.kind();
        let result = match &command {
            PersistCommand::Observation(obs) => self.store.append_observation(obs).await,
            PersistCommand::Alert(alert) => self.store.append_alert(alert).await,
            PersistCommand::Baseline(snapshot) => self.store.save_baseline(snapshot).await,
        };

        match result {
            Ok(()) => {
                debug!(kind, "Persisted record");
                if let Some(health) = &self.health {
                    health.record_success(components::PERSISTENCE).await;
                }
            }
            Err(e) => {
                warn!(kind, error = %e, "Failed to persist record");
                if let Some(health) = &self.health {
                    health
                        .record_failure(components::PERSISTENCE, e.to_string())
                        .await;
                }
            }
        }
    }
}
