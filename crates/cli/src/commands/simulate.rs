//! Replay a CSV of per-minute counts against a running monitor

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use monitor_lib::{history, Observation, Severity};
use serde::Serialize;

use crate::client::{ApiClient, TransactionRequest, TransactionVerdict};
use crate::output::{
    color_recommendation, color_score, color_severity, format_timestamp, print_json,
    print_success, print_warning, OutputFormat,
};

/// One replayed record and the monitor's answer
#[derive(Debug, Serialize)]
struct SimulatedRecord {
    request: TransactionRequest,
    verdict: TransactionVerdict,
}

#[derive(Debug, Default, Serialize)]
struct SimulationTotals {
    sent: usize,
    rejected: usize,
    alerts: usize,
    critical: usize,
}

impl SimulationTotals {
    fn record(&mut self, verdict: &TransactionVerdict) {
        self.sent += 1;
        if verdict.should_alert {
            self.alerts += 1;
            if verdict.severity == Severity::Critical {
                self.critical += 1;
            }
        }
    }
}

fn to_request(observation: &Observation) -> TransactionRequest {
    TransactionRequest {
        timestamp: observation.timestamp.to_rfc3339(),
        status: observation.status.as_str().to_string(),
        count: observation.count,
    }
}

/// Send every row of `file` in timestamp order and print each verdict
pub async fn simulate(
    client: &ApiClient,
    file: &Path,
    delay_ms: u64,
    alerts_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let import = history::load_csv(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if !import.rejected.is_empty() {
        print_warning(&format!(
            "Skipping {} invalid rows (first: line {}: {})",
            import.rejected.len(),
            import.rejected[0].line,
            import.rejected[0].reason
        ));
    }

    let mut totals = SimulationTotals::default();
    let mut records = Vec::new();

    for observation in &import.observations {
        let request = to_request(observation);
        let verdict = match client.send_transaction(&request).await {
            Ok(verdict) => verdict,
            Err(e) => {
                totals.rejected += 1;
                print_warning(&format!(
                    "{} {} {}: {}",
                    format_timestamp(observation.timestamp),
                    observation.status,
                    observation.count,
                    e
                ));
                continue;
            }
        };
        totals.record(&verdict);

        if !alerts_only || verdict.should_alert {
            match format {
                OutputFormat::Table => print_verdict(observation, &verdict),
                OutputFormat::Json => records.push(SimulatedRecord { request, verdict }),
            }
        }

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "records": records,
            "totals": totals,
        }))?,
        OutputFormat::Table => {
            println!();
            print_success(&format!(
                "Sent {} records: {} alerts ({} critical), {} rejected",
                totals.sent, totals.alerts, totals.critical, totals.rejected
            ));
        }
    }

    Ok(())
}

fn print_verdict(observation: &Observation, verdict: &TransactionVerdict) {
    println!(
        "{}  {:<16} {:>6}  score {:>3}  {:<8}  {}",
        format_timestamp(observation.timestamp),
        observation.status.as_str(),
        observation.count,
        color_score(verdict.anomaly_score),
        color_severity(verdict.severity),
        color_recommendation(&verdict.recommendation)
    );
    for alert in &verdict.alerts {
        let marker = if alert.emitted {
            "alert".red().to_string()
        } else {
            "suppressed".dimmed().to_string()
        };
        println!("    {} {}", marker, alert.message);
    }
}
