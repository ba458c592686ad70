//! vwstream binary.
//!
//! Streams JSON-lines examples through the online-learning engine and writes
//! the correlated predictions back out as JSON lines.

use clap::Parser;
use tracing::info;
use vwstream_core::cli::commands::Commands;
use vwstream_core::cli::{handle_encode, handle_train, init_logging};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _guard = init_logging(cli.command.logging())?;
    info!("vwstream starting up");

    match cli.command {
        Commands::Train(cmd) => handle_train(cmd).await?,
        Commands::Encode(cmd) => handle_encode(cmd).await?,
    }

    Ok(())
}
