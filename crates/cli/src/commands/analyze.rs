//! Offline anomaly-pattern analysis of a CSV export

use std::path::Path;

use anyhow::{Context, Result};
use monitor_lib::{
    anomaly::RuleEvaluator,
    history,
    reporting::{analyze_patterns, StatusPattern},
};
use tabled::Tabled;

use crate::output::{
    format_rate, format_timestamp, print_info, print_json, print_rows, print_warning, OutputFormat,
};

/// Row for the pattern table
#[derive(Tabled)]
struct PatternRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Minutes")]
    minutes: usize,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std")]
    std: String,
    #[tabled(rename = "Min")]
    min: String,
    #[tabled(rename = "Max")]
    max: String,
    #[tabled(rename = "Warning")]
    warning: String,
    #[tabled(rename = "Critical")]
    critical: String,
}

impl From<&StatusPattern> for PatternRow {
    fn from(p: &StatusPattern) -> Self {
        Self {
            status: p.status.as_str().to_uppercase(),
            minutes: p.minutes,
            mean: format_rate(p.mean_rate),
            std: format_rate(p.std_rate),
            min: format_rate(p.min_rate),
            max: format_rate(p.max_rate),
            warning: format!(
                "{} (>= {})",
                p.warning_minutes,
                format_rate(p.warning_pct)
            ),
            critical: format!(
                "{} (>= {})",
                p.critical_minutes,
                format_rate(p.critical_pct)
            ),
        }
    }
}

/// Profile every status with rule thresholds over the CSV history
pub async fn analyze_file(file: &Path, format: OutputFormat) -> Result<()> {
    let import = history::load_csv(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let patterns = analyze_patterns(&import.observations, &RuleEvaluator::default());

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "observations": import.observations.len(),
            "rejected": import.rejected,
            "patterns": patterns,
        }))?,
        OutputFormat::Table => {
            if !import.rejected.is_empty() {
                print_warning(&format!("Skipped {} invalid rows", import.rejected.len()));
            }
            if patterns.iter().all(|p| p.minutes == 0) {
                print_warning("No minutes with traffic found");
                return Ok(());
            }

            print_rows(patterns.iter().map(PatternRow::from).collect::<Vec<_>>());

            for pattern in patterns.iter().filter(|p| !p.critical_samples.is_empty()) {
                println!();
                print_info(&format!(
                    "{} critical minutes (showing {}):",
                    pattern.status.as_str().to_uppercase(),
                    pattern.critical_samples.len()
                ));
                for sample in &pattern.critical_samples {
                    println!(
                        "    {}  {} ({}/{})",
                        format_timestamp(sample.timestamp),
                        format_rate(sample.rate),
                        sample.count,
                        sample.total
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_analyze_csv_in_both_formats() {
        let mut csv = tempfile::NamedTempFile::new().unwrap();
        writeln!(csv, "timestamp,status,count").unwrap();
        writeln!(csv, "2025-07-12 13:00:00,approved,95").unwrap();
        writeln!(csv, "2025-07-12 13:00:00,failed,5").unwrap();
        writeln!(csv, "2025-07-12 13:01:00,approved,100").unwrap();
        writeln!(csv, "2025-07-12 13:01:00,bogus,1").unwrap();

        assert!(analyze_file(csv.path(), OutputFormat::Table).await.is_ok());
        assert!(analyze_file(csv.path(), OutputFormat::Json).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = analyze_file(Path::new("/nonexistent/history.csv"), OutputFormat::Table).await;
        assert!(result.is_err());
    }
}
