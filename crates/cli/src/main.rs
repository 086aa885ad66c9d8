//! Transaction Monitor CLI
//!
//! A command-line tool for replaying transaction history into the monitor,
//! analyzing historical CSV exports offline, and querying live metrics,
//! alerts and baselines.

mod client;
mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{analyze, query, simulate};

/// Transaction Monitor CLI
#[derive(Parser)]
#[command(name = "txmon")]
#[command(author, version, about = "CLI for the Transaction Monitor", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via TXMON_API_URL env var)
    #[arg(long, env = "TXMON_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream a CSV of per-minute counts to the monitor and print verdicts
    Simulate {
        /// CSV file with timestamp,status,count columns
        file: PathBuf,

        /// Pause between records in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,

        /// Only print records that raised an alert
        #[arg(long)]
        alerts_only: bool,
    },

    /// Analyze anomaly patterns in a CSV offline
    Analyze {
        /// CSV file with timestamp,status,count columns
        file: PathBuf,
    },

    /// Query the running monitor
    #[command(subcommand)]
    Get(GetCommands),
}

#[derive(Subcommand)]
pub enum GetCommands {
    /// Current window rates per status
    Metrics {
        /// Window length in minutes (server default if not specified)
        #[arg(long, short)]
        window: Option<u32>,
    },

    /// Recent alert records, newest first
    Alerts {
        /// Maximum number of records
        #[arg(long, short, default_value_t = 10)]
        limit: usize,
    },

    /// Current baseline per status
    Baseline,

    /// Alert counts by severity and status
    Summary {
        /// Lookback in minutes
        #[arg(long, short, default_value_t = 60)]
        minutes: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;
    let format = cli
        .format
        .or_else(|| settings.output_format())
        .unwrap_or_default();

    let api_url = settings.resolve_api_url(cli.api_url.as_deref());
    if cli.verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }

    match cli.command {
        Commands::Analyze { file } => {
            analyze::analyze_file(&file, format).await?;
        }
        Commands::Simulate {
            file,
            delay_ms,
            alerts_only,
        } => {
            let client = client::ApiClient::new(&api_url)?;
            simulate::simulate(&client, &file, delay_ms, alerts_only, format).await?;
        }
        Commands::Get(get_cmd) => {
            let client = client::ApiClient::new(&api_url)?;
            match get_cmd {
                GetCommands::Metrics { window } => {
                    query::get_metrics(&client, window, format).await?;
                }
                GetCommands::Alerts { limit } => {
                    query::get_alerts(&client, limit, format).await?;
                }
                GetCommands::Baseline => {
                    query::get_baseline(&client, format).await?;
                }
                GetCommands::Summary { minutes } => {
                    query::get_summary(&client, minutes, format).await?;
                }
            }
        }
    }

    Ok(())
}
