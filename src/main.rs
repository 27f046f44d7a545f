//! Classy Transactions Sync CLI
//!
//! Exports a campaign's fundraising transactions to a JSON file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use classy_sync::auth::TokenManager;
use classy_sync::classy::{describe_fields, ClassyClient};
use classy_sync::config::SyncConfig;
use classy_sync::logging::init_logging;
use classy_sync::sync::run_sync;

#[derive(Parser)]
#[command(name = "classy-sync")]
#[command(version)]
#[command(about = "Export Classy campaign transactions to JSON", long_about = None)]
struct Cli {
    /// Path to configuration file (optional, uses env vars if not provided)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output file path (overrides configuration)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, normalize and export all transactions (default)
    Sync,

    /// Verify the API credentials by requesting an access token
    CheckAuth,

    /// Fetch a sample page and print its structure
    Inspect {
        /// Number of transactions to request
        #[arg(long, default_value = "2")]
        per_page: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(output) = &cli.output {
        config.paths.output_file = output.clone();
    }

    let _guard = match init_logging(&config.paths.log_file, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => cmd_sync(&config).await,
        Commands::CheckAuth => cmd_check_auth(&config).await,
        Commands::Inspect { per_page } => cmd_inspect(&config, per_page).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Sync failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    match &cli.config {
        Some(path) => SyncConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => SyncConfig::load().context("Failed to load config from environment"),
    }
}

async fn cmd_sync(config: &SyncConfig) -> Result<()> {
    info!("=== Classy Transactions Sync ===");
    run_sync(config).await?;
    Ok(())
}

async fn cmd_check_auth(config: &SyncConfig) -> Result<()> {
    info!("=== Checking Classy API Credentials ===");

    let mut tokens = TokenManager::new(config).context("Failed to build token client")?;
    let token = tokens
        .get_token()
        .await
        .context("Classy API authentication failed")?;

    info!("Classy API connection successful");
    info!("Token valid until {}", token.expires_at().format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}

async fn cmd_inspect(config: &SyncConfig, per_page: u32) -> Result<()> {
    info!("=== API Response Structure ===");

    let mut client = ClassyClient::new(config).context("Failed to build Classy API client")?;
    let page = client
        .fetch_transaction_page(1, per_page.max(1))
        .await
        .context("Failed to fetch sample page")?;

    match page.total {
        Some(total) => info!("Total transactions available: {}", total),
        None => info!("Total transactions available: unknown"),
    }

    let transactions = page.into_transactions();
    info!("Transactions in this response: {}", transactions.len());

    let Some(first) = transactions.first() else {
        return Ok(());
    };

    info!("=== Sample Transaction ===");
    info!("{}", serde_json::to_string_pretty(first)?);

    info!("=== Available Top-Level Fields ===");
    for line in describe_fields(first) {
        info!("{}", line);
    }

    Ok(())
}
