use std::path::PathBuf;

use clap::Args;

use super::config::LoggingConfig;
use crate::config::ConfigArgs;

#[derive(Args)]
pub struct EncodeCommand {
    /// JSON-lines examples to read (stdin when omitted)
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(flatten)]
    pub logging: LoggingConfig,
}
