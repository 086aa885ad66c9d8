//! Server configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use monitor_lib::DetectorConfig;
use serde::Deserialize;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "TXMON_CONFIG";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Instance name attached to structured log records
    #[serde(default = "default_instance")]
    pub instance: String,

    /// HTTP port for ingestion, queries, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory of the durable JSON-lines store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// CSV of historical counts used when the durable store is empty
    #[serde(default)]
    pub seed_csv: Option<PathBuf>,

    /// File receiving emitted alerts as JSON lines
    #[serde(default)]
    pub alert_log: Option<PathBuf>,

    #[serde(default)]
    pub detector: DetectorConfig,
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "txmon".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            instance: default_instance(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
            seed_csv: None,
            alert_log: None,
            detector: DetectorConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from the optional file in `TXMON_CONFIG` and the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load with an explicit file; environment variables take precedence over it
    pub fn load_from(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("TXMON")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read configuration sources")?;

        let config: MonitorConfig = config
            .try_deserialize()
            .context("invalid monitor configuration")?;
        config.detector.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::TransactionStatus;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.seed_csv.is_none());
        assert_eq!(config.detector.window_minutes, 15);
    }

    #[test]
    fn test_file_overrides_detector_settings() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
api_port = 9191
data_dir = "/var/lib/txmon"

[detector]
cooldown_secs = 120
symmetric_statuses = ["approved"]

[detector.thresholds.failed]
warning_pct = 0.5
critical_pct = 1.5
"#
        )
        .unwrap();

        let config = MonitorConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.api_port, 9191);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/txmon"));
        assert_eq!(config.detector.cooldown_secs, 120);
        assert_eq!(config.detector.window_minutes, 15);
        assert_eq!(
            config.detector.symmetric_statuses,
            vec![TransactionStatus::Approved]
        );
        let failed = config.detector.thresholds[&TransactionStatus::Failed];
        assert_eq!(failed.critical_pct, 1.5);
    }

    #[test]
    fn test_invalid_detector_settings_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[detector]\nwindow_minutes = 0").unwrap();

        assert!(MonitorConfig::load_from(Some(file.path())).is_err());
    }
}
