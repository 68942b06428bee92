use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use contract_ledger::{
    is_valid_reference_month, Config, FilteredContractsService, PostgresStore,
};

#[derive(Parser)]
#[command(name = "contract-ledger")]
#[command(about = "Idempotent ledger of contracts already filtered per analysis month")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(long, default_value = "contract-ledger.yml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a batch of filtered contracts for the current month
    Register {
        /// Path to a JSON array of contract records (or read from stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// User recorded with each registration
        #[arg(long, env = "USER")]
        user: Option<String>,
    },

    /// List which contracts are already registered for a month
    Check {
        /// Path to a JSON array of contract records (or read from stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Reference month (MM-YYYY), defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },

    /// Keep only the contracts not yet registered for a month
    Filter {
        /// Path to a JSON array of contract records (or read from stdin)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Reference month (MM-YYYY), defaults to the current month
        #[arg(long)]
        month: Option<String>,

        /// Write remaining contracts to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("contract_ledger=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database.url());
    let store = PostgresStore::new(&database_url, config.database.max_connections).await?;

    match cli.command {
        Commands::Migrate => {
            store.migrate().await?;
            println!("Migrations complete");
        }
        Commands::Register { input, user } => {
            let contracts = read_contracts(input)?;
            let user = user.unwrap_or_else(|| config.registration.default_user.clone());

            let service = FilteredContractsService::new(store);
            let result = service.register_batch(&contracts, &user).await;

            println!("{}", serde_json::to_string_pretty(&result)?);

            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Check { input, month } => {
            validate_month(month.as_deref())?;
            let contracts = read_contracts(input)?;

            let service = FilteredContractsService::new(store);
            let registered = service
                .list_already_registered(&contracts, month.as_deref())
                .await;

            println!("{}", serde_json::to_string_pretty(&registered)?);
        }
        Commands::Filter {
            input,
            month,
            output,
        } => {
            validate_month(month.as_deref())?;
            let contracts = read_contracts(input)?;

            let service = FilteredContractsService::new(store);
            let remaining = service.select_unprocessed(&contracts, month.as_deref()).await;

            let content = serde_json::to_string_pretty(&remaining)?;
            match output {
                Some(path) => {
                    fs::write(&path, content)
                        .with_context(|| format!("Failed to write output: {}", path.display()))?;
                    println!("Wrote {} contracts to {}", remaining.len(), path.display());
                }
                None => println!("{}", content),
            }
        }
    }

    Ok(())
}

/// Read a JSON array of contract records from a file or stdin
fn read_contracts(input: Option<PathBuf>) -> Result<Vec<Value>> {
    let content = match input {
        Some(path) => fs::read_to_string(&path)
            .with_context(|| format!("Failed to read contracts file: {}", path.display()))?,
        None => {
            use std::io::Read;
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read contracts from stdin")?;
            buffer
        }
    };

    let contracts: Vec<Value> =
        serde_json::from_str(&content).context("Failed to parse contracts JSON array")?;

    Ok(contracts)
}

fn validate_month(month: Option<&str>) -> Result<()> {
    if let Some(month) = month {
        if !is_valid_reference_month(month) {
            anyhow::bail!("Invalid reference month '{}', expected MM-YYYY", month);
        }
    }
    Ok(())
}
