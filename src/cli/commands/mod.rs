pub mod config;
pub mod encode;
pub mod train;

pub use config::LoggingConfig;
pub use encode::EncodeCommand;
pub use train::TrainCommand;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Stream examples through the engine and write predictions
    Train(TrainCommand),
    /// Print the wire encoding of examples without launching the engine
    Encode(EncodeCommand),
}

impl Commands {
    pub fn logging(&self) -> &LoggingConfig {
        match self {
            Commands::Train(cmd) => &cmd.logging,
            Commands::Encode(cmd) => &cmd.logging,
        }
    }
}
