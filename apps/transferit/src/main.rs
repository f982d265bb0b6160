//! transferit entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Hand a file from one client to another through a single-chunk slot.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (missing file = defaults)
    #[arg(short, long, global = true, default_value = "transferit.toml")]
    pub config: PathBuf,

    /// Server host, overriding the configuration file
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port, overriding the configuration file
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the transfer server
    Serve,

    /// Upload a file, starting a new transfer unless one is given
    Upload {
        file: PathBuf,

        /// Existing transfer to upload into
        #[arg(short, long)]
        transfer_id: Option<String>,

        /// Chunk size in bytes, overriding the configuration file
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Download a transfer into a file
    Download { transfer_id: String, output: PathBuf },

    /// Show the state of a transfer
    Status { transfer_id: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = config::Config::load(&cli.config)?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli.command, config))
}
