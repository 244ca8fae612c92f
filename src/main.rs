//! pumpshort - pump-and-stall short strategy runner
//!
//! # WARNING
//! - Shorting a pumping coin has unbounded risk. Stops can gap.
//! - Backtest results do not carry over to live markets one to one.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use pump_short::cli::commands;
use pump_short::config::Config;

/// Pump-and-stall short strategy
#[derive(Parser)]
#[command(name = "pumpshort")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml", env = "PUMPSHORT_CONFIG")]
    config: String,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay JSONL history through the strategy
    Backtest {
        /// History files (JSON Lines, one snapshot per line)
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Write the trade log here (JSON Lines)
        #[arg(long)]
        trades_out: Option<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream a history file through the live loop (simulated orders)
    Paper {
        /// History file (JSON Lines)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Show the last saved account state
    Status,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    init_tracing(cli.json_logs)?;

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Backtest {
            input,
            trades_out,
            json,
        } => commands::backtest(&config, &input, trades_out, json).await,
        Commands::Paper { input } => commands::paper(&config, input).await,
        Commands::Status => commands::status(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("pump_short=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
