//! Startup restoration from the durable store

use std::path::Path;

use anyhow::{Context, Result};
use monitor_lib::{
    health::{components, HealthRegistry},
    history,
    store::DurableStore,
    DetectionEngine,
};
use tracing::{info, warn};

/// What bootstrap restored
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub observations: usize,
    pub seeded_from_csv: bool,
    pub baseline_restored: bool,
    pub alerts_restored: usize,
}

/// Restore the last baseline, history and alert records into `engine`.
///
/// An unreadable store degrades the `store` component rather than failing
/// startup; a missing or malformed seed CSV is an error.
pub async fn restore(
    engine: &DetectionEngine,
    durable: &dyn DurableStore,
    seed_csv: Option<&Path>,
    health: &HealthRegistry,
) -> Result<BootstrapReport> {
    let mut report = BootstrapReport::default();

    match durable.load_baseline().await {
        Ok(Some(snapshot)) => {
            engine.install_baseline(snapshot);
            report.baseline_restored = true;
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not load saved baseline"),
    }

    let stored = match durable.load_history(None).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, "Could not load observation history");
            health
                .set_degraded(components::STORE, format!("history unavailable: {}", e))
                .await;
            Vec::new()
        }
    };

    if stored.is_empty() {
        if let Some(path) = seed_csv {
            let import = history::load_csv(path)
                .await
                .with_context(|| format!("failed to load seed CSV {}", path.display()))?;
            for observation in &import.observations {
                durable
                    .append_observation(observation)
                    .await
                    .context("failed to persist seed observations")?;
            }
            report.observations = engine.seed(import.observations);
            report.seeded_from_csv = true;
            info!(path = %path.display(), observations = report.observations, "Seeded history from CSV");
        }
    } else {
        report.observations = engine.seed(stored);
    }

    match durable.load_alerts(engine.config().alert_history_size).await {
        Ok(alerts) => {
            report.alerts_restored = alerts.len();
            engine.restore_alerts(alerts);
        }
        Err(e) => warn!(error = %e, "Could not load alert history"),
    }

    Ok(report)
}
