//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use monitor_lib::Severity;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Render rows as a rounded table
pub fn print_rows<T: tabled::Tabled>(rows: Vec<T>) {
    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a percentage rate
pub fn format_rate(rate: f64) -> String {
    format!("{:.2}%", rate)
}

/// Format an optional z-score, `-` when undefined
pub fn format_z_score(z_score: Option<f64>) -> String {
    z_score.map_or_else(|| "-".to_string(), |z| format!("{:.2}", z))
}

/// Format a timestamp the way the monitor's CSV input writes it
pub fn format_timestamp(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

/// Color severity based on tier
pub fn color_severity(severity: Severity) -> String {
    let label = severity.as_str();
    match severity {
        Severity::Critical => label.red().bold().to_string(),
        Severity::Warning => label.yellow().to_string(),
        Severity::Info => label.green().to_string(),
    }
}

/// Color a combined 0-100 anomaly score by the tier it falls in
pub fn color_score(score: u32) -> String {
    let formatted = score.to_string();
    if score >= 75 {
        formatted.red().to_string()
    } else if score >= 50 {
        formatted.yellow().to_string()
    } else {
        formatted.normal().to_string()
    }
}

/// Color the server's ALERT/OK recommendation
pub fn color_recommendation(recommendation: &str) -> String {
    match recommendation {
        "ALERT" => recommendation.red().bold().to_string(),
        "OK" => recommendation.green().to_string(),
        _ => recommendation.to_string(),
    }
}
