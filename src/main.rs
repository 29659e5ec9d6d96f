//! fixity - checksum verification for preservation storage.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use fixity::commands;
use fixity::config::FixityConfig;
use fixity::logging;
use fixity::sweep::{DEFAULT_SWEEP_PAGE_SIZE, SweepFilter};

#[derive(Parser)]
#[command(name = "fixity", version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/fixity/fixity.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute and record the checksum of a newly stored object
    Deposit {
        container: String,
        key: String,
        /// Integrity tag reported by the store (e.g. an ETag)
        #[arg(long)]
        tag: Option<String>,
    },
    /// Re-verify an object against its recorded checksum
    Verify { container: String, key: String },
    /// Stop tracking an object
    Forget { container: String, key: String },
    /// Show the ledger record for an object
    Status { container: String, key: String },
    /// Re-verify ledger records in bulk
    Sweep {
        /// Which records to re-verify: overdue, failed or all
        #[arg(long, default_value_t = SweepFilter::Overdue)]
        filter: SweepFilter,
        #[arg(long, default_value_t = DEFAULT_SWEEP_PAGE_SIZE)]
        page_size: usize,
    },
    /// Run the daemon (HTTP trigger API, expiry watcher, failure detector)
    Serve,
    /// Validate the configuration and print warnings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = FixityConfig::load(cli.config.as_deref())?;
    logging::init(&config.logging);

    match cli.command {
        Commands::Deposit {
            container,
            key,
            tag,
        } => commands::record::deposit(&config, &container, &key, tag.as_deref()).await,
        Commands::Verify { container, key } => {
            commands::record::verify(&config, &container, &key).await
        },
        Commands::Forget { container, key } => {
            commands::record::forget(&config, &container, &key).await
        },
        Commands::Status { container, key } => {
            commands::record::status(&config, &container, &key).await
        },
        Commands::Sweep { filter, page_size } => {
            commands::sweep::execute(&config, filter, page_size).await
        },
        Commands::Serve => commands::serve::execute(config).await,
        Commands::CheckConfig => commands::check_config::execute(&config, cli.config.as_deref()),
    }
}
