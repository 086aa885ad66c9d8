//! Durable storage collaborator
//!
//! The detection core only sees the [`DurableStore`] trait. [`JsonFileStore`]
//! is the bundled implementation: append-only JSON lines for observations and
//! alerts, and an atomically replaced JSON document for the baseline snapshot.
//! The observation log is rewritten by [`DurableStore::compact_history`]
//! after each baseline refresh so it only spans the history still in use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::baseline::BaselineSnapshot;
use crate::error::MonitorError;
use crate::models::{AlertRecord, Observation};

const OBSERVATIONS_FILE: &str = "observations.jsonl";
const ALERTS_FILE: &str = "alerts.jsonl";
const BASELINE_FILE: &str = "baseline.json";

/// Persistent record of observations, alerts and baseline snapshots
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Load observations, optionally only those at or after `since`
    async fn load_history(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, MonitorError>;

    async fn append_observation(&self, observation: &Observation) -> Result<(), MonitorError>;

    async fn append_alert(&self, alert: &AlertRecord) -> Result<(), MonitorError>;

    async fn save_baseline(&self, snapshot: &BaselineSnapshot) -> Result<(), MonitorError>;

    /// Last saved baseline snapshot, if any
    async fn load_baseline(&self) -> Result<Option<BaselineSnapshot>, MonitorError>;

    /// The most recent `limit` alert records, oldest first
    async fn load_alerts(&self, _limit: usize) -> Result<Vec<AlertRecord>, MonitorError> {
        Ok(Vec::new())
    }

    /// Drop observations older than `before`, returning how many were removed
    async fn compact_history(&self, _before: DateTime<Utc>) -> Result<usize, MonitorError> {
        Ok(0)
    }
}

/// File-backed store rooted at a data directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
    /// Held by observation appends and compaction
    observations: Arc<Mutex<()>>,
}

impl JsonFileStore {
    /// Open (and create if needed) a store in `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MonitorError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            MonitorError::StoreUnavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;
        Ok(Self {
            dir,
            observations: Arc::new(Mutex::new(())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn append_line<T: serde::Serialize>(
        &self,
        file: &str,
        value: &T,
    ) -> Result<(), MonitorError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let path = self.dir.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| unavailable(&path, e))?;
        handle.write_all(&line).await.map_err(|e| unavailable(&path, e))?;
        Ok(())
    }

    /// Replace `file` with `content` via a temp file and rename
    async fn replace_file(&self, file: &str, content: &[u8]) -> Result<(), MonitorError> {
        let path = self.dir.join(file);
        let temp_path = path.with_extension("tmp");

        let mut handle = fs::File::create(&temp_path)
            .await
            .map_err(|e| unavailable(&temp_path, e))?;
        handle
            .write_all(content)
            .await
            .map_err(|e| unavailable(&temp_path, e))?;
        handle
            .sync_all()
            .await
            .map_err(|e| unavailable(&temp_path, e))?;
        drop(handle);

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| unavailable(&path, e))
    }

    /// Parse a JSON-lines file, skipping lines that do not decode
    async fn read_lines<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, MonitorError> {
        let path = self.dir.join(file);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(unavailable(&path, e)),
        };

        let mut values = Vec::new();
        let mut skipped = 0usize;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<T>(line) {
                Ok(value) => values.push(value),
                // A torn trailing line from a concurrent append
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "Skipped unreadable lines");
        }
        Ok(values)
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> MonitorError {
    MonitorError::StoreUnavailable(format!("{}: {}", path.display(), err))
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn load_history(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Observation>, MonitorError> {
        let mut observations: Vec<Observation> = self.read_lines(OBSERVATIONS_FILE).await?;
        if let Some(since) = since {
            observations.retain(|obs| obs.timestamp >= since);
        }

        debug!(loaded = observations.len(), "Loaded observation history");
        Ok(observations)
    }

    async fn append_observation(&self, observation: &Observation) -> Result<(), MonitorError> {
        let _guard = self.observations.lock().await;
        self.append_line(OBSERVATIONS_FILE, observation).await
    }

    async fn append_alert(&self, alert: &AlertRecord) -> Result<(), MonitorError> {
        self.append_line(ALERTS_FILE, alert).await
    }

    async fn save_baseline(&self, snapshot: &BaselineSnapshot) -> Result<(), MonitorError> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        self.replace_file(BASELINE_FILE, &json).await
    }

    async fn load_baseline(&self) -> Result<Option<BaselineSnapshot>, MonitorError> {
        let path = self.dir.join(BASELINE_FILE);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    async fn load_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, MonitorError> {
        let mut alerts: Vec<AlertRecord> = self.read_lines(ALERTS_FILE).await?;
        if alerts.len() > limit {
            alerts.drain(..alerts.len() - limit);
        }
        Ok(alerts)
    }

    async fn compact_history(&self, before: DateTime<Utc>) -> Result<usize, MonitorError> {
        let _guard = self.observations.lock().await;

        let observations: Vec<Observation> = self.read_lines(OBSERVATIONS_FILE).await?;
        let total = observations.len();
        let kept: Vec<Observation> = observations
            .into_iter()
            .filter(|obs| obs.timestamp >= before)
            .collect();
        let removed = total - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut content = Vec::new();
        for observation in &kept {
            serde_json::to_writer(&mut content, observation)?;
            content.push(b'\n');
        }
        self.replace_file(OBSERVATIONS_FILE, &content).await?;

        debug!(removed, kept = kept.len(), "Compacted observation history");
        Ok(removed)
    }
}
