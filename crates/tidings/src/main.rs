// SPDX-FileCopyrightText: 2026 Tidings Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tidings - conversation ingestion and synchronization engine.
//!
//! Binary entry point: loads configuration, then hands off to the serve
//! loop.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod serve;

/// Tidings - conversation ingestion and synchronization engine.
#[derive(Parser, Debug)]
#[command(name = "tidings", version, about, long_about = None)]
struct Cli {
    /// Path to a configuration file (skips the XDG hierarchy lookup).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the engine: webhook ingress, sync timer, retention sweeper.
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tidings_config::load_and_validate_path(path),
        None => tidings_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("tidings: {e}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run(config).await {
                eprintln!("tidings serve: {e}");
                std::process::exit(1);
            }
        }
        None => {
            println!("tidings: use --help for available commands");
        }
    }
}
