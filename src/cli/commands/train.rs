use std::path::PathBuf;

use clap::Args;

use super::config::LoggingConfig;
use crate::config::ConfigArgs;

#[derive(Args)]
pub struct TrainCommand {
    /// JSON-lines examples to read (stdin when omitted)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Where to write JSON-lines predictions (stdout when omitted)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of passes over the input
    #[arg(short = 'p', long = "passes", default_value_t = 1)]
    pub passes: usize,

    /// Warm-start from a previously saved model
    #[arg(long = "initial-model", value_name = "FILE")]
    pub initial_model: Option<PathBuf>,

    /// Write the final model here once the engine exits
    #[arg(long = "save-model", value_name = "FILE")]
    pub save_model: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub logging: LoggingConfig,
}
