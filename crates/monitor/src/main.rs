//! Transaction Monitor - per-minute transaction status anomaly detection
//!
//! This binary accepts per-minute status counts over HTTP, scores them
//! against fixed thresholds and a periodically refreshed baseline, and
//! hands emitted alerts to the configured notification sinks.

use std::sync::Arc;

use anyhow::{Context, Result};
use monitor_lib::{
    baseline::BaselineRefresher,
    health::{components, HealthRegistry},
    notify::{DispatchWorker, JsonLinesSink, LogSink, NotificationSink, DEFAULT_DISPATCH_QUEUE},
    observability::StructuredLogger,
    store::{DurableStore, JsonFileStore, PersistenceWorker, DEFAULT_QUEUE_SIZE},
    DetectionEngine,
};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use transaction_monitor::{api, bootstrap, config::MonitorConfig};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting transaction-monitor");

    let config = MonitorConfig::load().context("failed to load configuration")?;
    info!(
        instance = %config.instance,
        data_dir = %config.data_dir.display(),
        window_minutes = config.detector.window_minutes,
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::STORE).await;
    health_registry.register(components::BASELINE).await;
    health_registry.register(components::PERSISTENCE).await;
    health_registry.register(components::DISPATCHER).await;

    let logger = StructuredLogger::new(&config.instance);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Background handoffs: persistence and notification
    let durable: Arc<dyn DurableStore> = Arc::new(
        JsonFileStore::open(&config.data_dir)
            .await
            .context("failed to open data directory")?,
    );
    let (persistence, persistence_worker) =
        PersistenceWorker::new(Arc::clone(&durable), DEFAULT_QUEUE_SIZE);
    let persistence_worker = persistence_worker.with_health(health_registry.clone());

    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink)];
    if let Some(path) = &config.alert_log {
        sinks.push(Arc::new(JsonLinesSink::new(path)));
    }
    let (dispatcher, dispatch_worker) = DispatchWorker::new(sinks, DEFAULT_DISPATCH_QUEUE);
    let dispatch_worker = dispatch_worker.with_health(health_registry.clone());

    let engine = Arc::new(
        DetectionEngine::new(config.detector.clone())
            .context("invalid detector configuration")?
            .with_persistence(persistence)
            .with_dispatcher(dispatcher)
            .with_logger(logger.clone()),
    );

    let report = bootstrap::restore(
        &engine,
        durable.as_ref(),
        config.seed_csv.as_deref(),
        &health_registry,
    )
    .await?;

    let refresher = BaselineRefresher::new(Arc::clone(&engine))
        .with_durable_store(Arc::clone(&durable))
        .with_health(health_registry.clone());
    if !refresher.tick().await && report.baseline_restored {
        warn!("Initial baseline refresh failed, serving the saved snapshot");
    }

    logger.log_startup(MONITOR_VERSION, report.observations, engine.baseline_loaded());

    let persistence_handle = tokio::spawn(persistence_worker.run(shutdown_tx.subscribe()));
    let dispatch_handle = tokio::spawn(dispatch_worker.run(shutdown_tx.subscribe()));
    let refresher_handle = tokio::spawn(refresher.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        Arc::clone(&engine),
        health_registry.clone(),
    ));

    // Mark monitor as ready after restoration
    health_registry.set_ready(true).await;

    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    for (name, handle) in [
        ("persistence", persistence_handle),
        ("dispatcher", dispatch_handle),
        ("baseline_refresher", refresher_handle),
    ] {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Background task ended abnormally");
        }
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server stopped with error"),
        Err(e) => warn!(error = %e, "API server task ended abnormally"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
