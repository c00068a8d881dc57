mod logging;

use clap::{Parser, Subcommand};
use comfy_table::Table;
use configuration::{load_config, load_config_from, Config};
use database::DbRepository;
use engine::{CleanupReport, EngineOptions, TradeService};
use std::path::PathBuf;
use std::sync::Arc;

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Trade settlement backend for the card marketplace.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults to `config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve,
    /// Apply pending database migrations and exit.
    Migrate,
    /// Delete the line items of long-resolved trades.
    Cleanup(CleanupArgs),
}

#[derive(Parser)]
struct CleanupArgs {
    /// Trades resolved more than this many days ago are eligible.
    /// Defaults to `retention.default_days`.
    #[arg(long)]
    retention_days: Option<u32>,

    /// Actually delete. Without this flag only counts are reported.
    #[arg(long)]
    execute: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file, if present.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let _log_guard = logging::init_logging(&config.logging);

    match cli.command {
        Commands::Serve => web_server::run_server(&config).await?,
        Commands::Migrate => handle_migrate(&config).await?,
        Commands::Cleanup(args) => handle_cleanup(args, &config).await?,
    }

    Ok(())
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_migrate(config: &Config) -> anyhow::Result<()> {
    let db_pool = database::connect(&config.database).await?;
    database::run_migrations(&db_pool).await?;
    tracing::info!("Database migrations applied.");
    Ok(())
}

async fn handle_cleanup(args: CleanupArgs, config: &Config) -> anyhow::Result<()> {
    let db_pool = database::connect(&config.database).await?;
    database::run_migrations(&db_pool).await?;
    let service = TradeService::new(Arc::new(DbRepository::new(db_pool)), EngineOptions::from(config));

    let report = service.cleanup(args.retention_days, !args.execute).await?;
    println!("{}", report_table(&report));
    if report.dry_run {
        println!("Dry run: nothing was deleted. Pass --execute to delete.");
    }
    Ok(())
}

fn report_table(report: &CleanupReport) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Retention (days)".to_string(), report.retention_days.to_string()]);
    table.add_row(vec!["Cutoff".to_string(), report.cutoff.to_rfc3339()]);
    table.add_row(vec!["Dry run".to_string(), report.dry_run.to_string()]);
    table.add_row(vec!["Trades affected".to_string(), report.trades_affected.to_string()]);
    table.add_row(vec!["Escrow lines".to_string(), report.escrow_lines.to_string()]);
    table.add_row(vec!["Requested lines".to_string(), report.requested_lines.to_string()]);
    table
}
