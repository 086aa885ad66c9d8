//! Queries against a running monitor

use anyhow::Result;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_score, color_severity, format_rate, format_timestamp, format_z_score, print_info,
    print_json, print_rows, print_warning, OutputFormat,
};

/// Row for the window metrics table
#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Total")]
    total: u64,
    #[tabled(rename = "Rate")]
    rate: String,
}

/// Row for the alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Rate")]
    rate: String,
    #[tabled(rename = "Z")]
    z_score: String,
    #[tabled(rename = "Sent")]
    emitted: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Row for the baseline table
#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std")]
    std_dev: String,
    #[tabled(rename = "Samples")]
    samples: usize,
}

/// Row for the alert summary table
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Alerts")]
    alerts: usize,
    #[tabled(rename = "Sent")]
    emitted: usize,
    #[tabled(rename = "Avg Score")]
    avg_score: String,
    #[tabled(rename = "Max Score")]
    max_score: u32,
    #[tabled(rename = "First")]
    first: String,
    #[tabled(rename = "Last")]
    last: String,
}

pub async fn get_metrics(client: &ApiClient, window: Option<u32>, format: OutputFormat) -> Result<()> {
    let result = client.window_metrics(window).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows: Vec<MetricRow> = result
                .metrics
                .values()
                .map(|m| MetricRow {
                    status: m.status.as_str().to_uppercase(),
                    count: m.window_count,
                    total: m.total_count,
                    rate: format_rate(m.rate),
                })
                .collect();
            print_rows(rows);
            println!(
                "\nWindow: {} minutes ending {}",
                result.window_minutes,
                format_timestamp(result.as_of)
            );
        }
    }

    Ok(())
}

pub async fn get_alerts(client: &ApiClient, limit: usize, format: OutputFormat) -> Result<()> {
    let result = client.recent_alerts(limit).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.alerts.is_empty() {
                print_warning("No alerts recorded");
                return Ok(());
            }

            let total = result.alerts.len();
            let rows: Vec<AlertRow> = result
                .alerts
                .into_iter()
                .map(|a| AlertRow {
                    time: format_timestamp(a.timestamp),
                    status: a.status.as_str().to_uppercase(),
                    severity: color_severity(a.severity),
                    score: color_score(a.score),
                    rate: format_rate(a.rate),
                    z_score: format_z_score(a.z_score),
                    emitted: if a.emitted { "yes" } else { "no" }.to_string(),
                    message: a.message,
                })
                .collect();
            print_rows(rows);
            println!("\nTotal: {} alerts", total);
        }
    }

    Ok(())
}

pub async fn get_baseline(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.baseline().await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if !result.loaded || result.baseline.stats.is_empty() {
                print_warning("No baseline computed yet");
                return Ok(());
            }

            let rows: Vec<BaselineRow> = result
                .baseline
                .stats
                .values()
                .map(|s| BaselineRow {
                    status: s.status.as_str().to_uppercase(),
                    mean: format_rate(s.mean_rate),
                    std_dev: s
                        .stddev_rate
                        .map_or_else(|| "undefined".to_string(), format_rate),
                    samples: s.sample_size,
                })
                .collect();
            print_rows(rows);
            print_info(&format!(
                "Refreshed {} from {} minute buckets",
                format_timestamp(result.baseline.refreshed_at),
                result.baseline.minute_buckets
            ));
        }
    }

    Ok(())
}

pub async fn get_summary(client: &ApiClient, minutes: u32, format: OutputFormat) -> Result<()> {
    let result = client.alert_summary(minutes).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.summary.is_empty() {
                print_warning(&format!("No alerts in the last {} minutes", minutes));
                return Ok(());
            }

            let rows: Vec<SummaryRow> = result
                .summary
                .iter()
                .map(|r| SummaryRow {
                    severity: color_severity(r.severity),
                    status: r.status.as_str().to_uppercase(),
                    alerts: r.alert_count,
                    emitted: r.emitted_count,
                    avg_score: format!("{:.1}", r.avg_score),
                    max_score: r.max_score,
                    first: format_timestamp(r.first_alert),
                    last: format_timestamp(r.last_alert),
                })
                .collect();
            print_rows(rows);
        }
    }

    Ok(())
}
