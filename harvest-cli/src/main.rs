//! `harvest`: incremental channel ingestion, raw loading and detection enrichment.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use bridge_traits::LogLevel;
use clap::{Args, Parser, Subcommand};
use core_runtime::config::{HarvestConfig, ENV_DATA_DIR};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(about = "Incremental channel harvester")]
#[command(version)]
struct Cli {
    /// Data root (overrides HARVEST_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Console log format: pretty, json or compact
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan channels and persist new items and images
    Scrape(ScrapeArgs),

    /// Load the item log into the database
    Load {
        /// Item log root (default: <data>/raw/telegram_messages)
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Run object detection over downloaded images
    Enrich,

    /// Incremental scrape, then load, then enrich
    Pipeline {
        #[arg(long, default_value = "channels.txt")]
        channels_file: PathBuf,

        #[arg(long, num_args = 1..)]
        channels: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    /// One channel per line; `#` starts a comment
    #[arg(long, default_value = "channels.txt")]
    pub channels_file: PathBuf,

    /// Additional channels
    #[arg(long, num_args = 1..)]
    pub channels: Vec<String>,

    /// Maximum new items per channel
    #[arg(long)]
    pub limit: Option<usize>,

    /// Skip items already in the item log
    #[arg(long)]
    pub incremental: bool,

    /// Inclusive lower bound (YYYY-MM-DD)
    #[arg(long)]
    pub since: Option<chrono::NaiveDate>,

    /// Exclusive upper bound (YYYY-MM-DD)
    #[arg(long)]
    pub until: Option<chrono::NaiveDate>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!(error = %format!("{:#}", e), "harvest failed");
        eprintln!("Error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.data_dir.as_ref())?;

    let mut logging = LoggingConfig::default()
        .with_level(cli.log_level)
        .with_log_file(config.log_file());
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    if let Ok(filter) = std::env::var("RUST_LOG") {
        logging = logging.with_filter(filter);
    }
    init_logging(logging).context("Failed to initialize logging")?;

    let cancel = CancellationToken::new();
    spawn_ctrl_c_handler(cancel.clone());

    match cli.command {
        Command::Scrape(args) => commands::scrape(&config, &args, cancel).await.map(|_| ()),
        Command::Load { source } => commands::load(&config, source).await.map(|_| ()),
        Command::Enrich => commands::enrich(&config).await.map(|_| ()),
        Command::Pipeline {
            channels_file,
            channels,
        } => commands::pipeline(&config, channels_file, channels, cancel).await,
    }
}

/// Environment configuration with `--data-dir` taking precedence.
fn load_config(data_dir: Option<&PathBuf>) -> Result<HarvestConfig> {
    HarvestConfig::from_lookup(|key| match (key, data_dir) {
        (ENV_DATA_DIR, Some(dir)) => Some(dir.display().to_string()),
        _ => std::env::var(key).ok(),
    })
    .context("Invalid configuration")
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current item");
            cancel.cancel();
        }
    });
}
