//! Epistula operator CLI
//!
//! Generates signing identities and runs inference or availability dispatch
//! against the miners listed in a TOML configuration file. Results are
//! printed to stdout as JSON; logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

mod commands;
mod config;

use config::CliConfig;

#[derive(Parser)]
#[command(name = "epistula")]
#[command(about = "Epistula - signed fan-out to inference miners", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "epistula.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new signing identity
    Keygen,

    /// Stream a chat-completion request to miners
    Query {
        /// Target uids, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        uids: Vec<u16>,

        /// JSON request body with `model` and `messages`
        #[arg(short, long)]
        body: PathBuf,
    },

    /// Ask miners which tasks and models they serve
    Availability {
        /// Target uids, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        uids: Vec<u16>,

        /// Task name to ask about (repeatable)
        #[arg(short, long)]
        task: Vec<String>,

        /// Model name to ask about (repeatable)
        #[arg(short, long)]
        model: Vec<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Keygen => {
            print_json(&commands::keygen())?;
        }

        Commands::Query { uids, body } => {
            let config = CliConfig::load(&cli.config).await?;
            print_json(&commands::query(&config, &uids, &body).await?)?;
        }

        Commands::Availability { uids, task, model } => {
            let config = CliConfig::load(&cli.config).await?;
            print_json(&commands::availability(&config, &uids, &task, &model).await?)?;
        }
    }

    Ok(())
}
