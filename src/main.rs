//! bitnode CLI Application
//!
//! Command-line access to the protocol framer and the header validator.

use bitnode::cli;
use bitnode::config::NodeConfig;
use bitnode::consensus::Network;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bitnode")]
#[command(author = "Darshan")]
#[command(version)]
#[command(about = "Protocol and header-consensus core for a Bitcoin-like node", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network to use, overrides the configuration file
    #[arg(short, long, value_enum)]
    network: Option<Network>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the genesis header of the network
    Genesis,

    /// Decode hex-encoded wire frames
    Decode {
        /// Raw frames as hex
        hex: String,
    },

    /// Replay a capture of raw wire frames through the header validator
    Replay {
        /// Capture file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(network) = cli.network {
        config.network = network;
    }

    match cli.command {
        Commands::Genesis => cli::cmd_genesis(config.network)?,
        Commands::Decode { hex } => cli::cmd_decode(&config, &hex)?,
        Commands::Replay { input } => cli::cmd_replay(&config, &input).await?,
        Commands::Config => cli::cmd_config(&config)?,
    }

    Ok(())
}
