mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Correlation tracking for process instances.
#[derive(Parser)]
#[command(
    name = "correlation",
    version,
    about = "Correlation tracking for process instances"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides the config file and CORRELATION_PORT)
        #[arg(long)]
        port: Option<u16>,
        /// Path to the TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    Config {
        /// Path to the TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, config } => {
            init_tracing();
            let mut config = load_or_exit(config.as_deref());
            if let Some(port) = port {
                config.port = port;
            }
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    eprintln!("error: failed to create tokio runtime: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(config)) {
                eprintln!("error: server failed: {}", e);
                process::exit(1);
            }
        }
        Commands::Config { config } => {
            let config = load_or_exit(config.as_deref());
            match serde_json::to_string_pretty(&config) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("error: could not serialize configuration: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}

fn load_or_exit(path: Option<&std::path::Path>) -> ServerConfig {
    match ServerConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
