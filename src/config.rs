//! Configuration management for the vwstream adapter.
//!
//! This module provides configuration handling through multiple sources:
//! 1. Default configuration (embedded in binary)
//! 2. User-specified configuration file
//! 3. Environment variables (prefixed with `VWSTREAM_`, nested keys joined with `__`)
//! 4. Command-line arguments
//!
//! Configuration options are loaded in order of precedence, with later sources
//! overriding earlier ones. A [`StreamConfig`] is immutable once an adapter has
//! been spawned from it.
//!
//! # Environment Variables
//!
//! - `VWSTREAM_ENGINE_PATH` - Engine binary
//! - `VWSTREAM_LOSS_FUNCTION` - Loss function selector
//! - `VWSTREAM_BIT_PRECISION` - Number of hash bits
//! - `VWSTREAM_SNAPSHOT__TIMEOUT_MS` - Snapshot polling budget

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::constants::{engine, snapshot};
use crate::error::{Error, Result};
use crate::loss::LossFunction;

/// Configuration overrides accepted on the command line
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Engine binary to launch
    #[arg(long, value_name = "PATH")]
    pub engine_path: Option<PathBuf>,

    /// Loss function (squared, classic, hinge, logistic, quantile)
    #[arg(long)]
    pub loss_function: Option<String>,

    /// Quantile for the quantile loss
    #[arg(long)]
    pub quantile_tau: Option<f64>,

    /// Number of hash bits
    #[arg(short = 'b', long)]
    pub bit_precision: Option<u32>,

    /// L1 regularization coefficient
    #[arg(long)]
    pub l1: Option<f64>,

    /// L2 regularization coefficient
    #[arg(long)]
    pub l2: Option<f64>,

    /// Learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Pairwise interaction between two namespaces, as `first:second`
    #[arg(short = 'q', long = "quadratic", value_name = "NS:NS")]
    pub quadratic: Vec<String>,

    /// Keep the state needed to resume training from saved models
    #[arg(long)]
    pub save_resume: bool,

    /// Snapshot polling budget in milliseconds
    #[arg(long)]
    pub snapshot_timeout_ms: Option<u64>,
}

/// Snapshot polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Interval between file-system checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Total time allowed for the engine to write the snapshot
    #[serde(default = "default_snapshot_timeout_ms")]
    pub timeout_ms: u64,
}

impl SnapshotConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_snapshot_timeout_ms(),
        }
    }
}

/// Adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Engine binary
    #[serde(default = "default_engine_path")]
    pub engine_path: PathBuf,
    /// Loss function selector, validated when the first loss is computed
    #[serde(default = "default_loss_function")]
    pub loss_function: String,
    /// Quantile for the quantile loss (0.5 when unset)
    #[serde(default)]
    pub quantile_tau: Option<f64>,
    /// Number of hash bits
    #[serde(default = "default_bit_precision")]
    pub bit_precision: u32,
    #[serde(default)]
    pub l1: Option<f64>,
    #[serde(default)]
    pub l2: Option<f64>,
    #[serde(default)]
    pub learning_rate: Option<f64>,
    /// Namespace-name pairs requesting pairwise feature interactions
    #[serde(default)]
    pub quadratic: Vec<(String, String)>,
    #[serde(default)]
    pub save_resume: bool,
    /// Lines queued ahead of the engine's input pipe before senders wait
    #[serde(default = "default_input_queue_capacity")]
    pub input_queue_capacity: usize,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// Model bytes to warm-start from
    #[serde(skip)]
    pub initial_model: Option<Vec<u8>>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            engine_path: default_engine_path(),
            loss_function: default_loss_function(),
            quantile_tau: None,
            bit_precision: default_bit_precision(),
            l1: None,
            l2: None,
            learning_rate: None,
            quadratic: Vec::new(),
            save_resume: false,
            input_queue_capacity: default_input_queue_capacity(),
            snapshot: SnapshotConfig::default(),
            initial_model: None,
        }
    }
}

impl StreamConfig {
    /// Load configuration from all sources
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            include_str!("../config/default.toml"),
            config::FileFormat::Toml,
        ));

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("VWSTREAM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: StreamConfig = builder.build()?.try_deserialize()?;
        config.apply_args(args)?;
        Ok(config)
    }

    /// Override with command line args
    pub fn apply_args(&mut self, args: &ConfigArgs) -> Result<()> {
        if let Some(path) = &args.engine_path {
            self.engine_path = path.clone();
        }
        if let Some(loss) = &args.loss_function {
            self.loss_function = loss.clone();
        }
        if let Some(tau) = args.quantile_tau {
            self.quantile_tau = Some(tau);
        }
        if let Some(bits) = args.bit_precision {
            self.bit_precision = bits;
        }
        if let Some(l1) = args.l1 {
            self.l1 = Some(l1);
        }
        if let Some(l2) = args.l2 {
            self.l2 = Some(l2);
        }
        if let Some(rate) = args.learning_rate {
            self.learning_rate = Some(rate);
        }
        for pair in &args.quadratic {
            let (first, second) = pair.split_once(':').ok_or_else(|| {
                Error::Config(format!("quadratic pair '{}' must look like first:second", pair))
            })?;
            self.quadratic.push((first.to_string(), second.to_string()));
        }
        if args.save_resume {
            self.save_resume = true;
        }
        if let Some(timeout) = args.snapshot_timeout_ms {
            self.snapshot.timeout_ms = timeout;
        }
        Ok(())
    }

    /// Loss function resolved from the selector.
    pub fn loss(&self) -> Result<LossFunction> {
        LossFunction::parse(&self.loss_function, self.quantile_tau)
    }

    /// Quantile passed to the engine, only meaningful under the quantile loss.
    pub fn effective_quantile_tau(&self) -> Option<f64> {
        if self.loss_function == "quantile" {
            Some(self.quantile_tau.unwrap_or(engine::DEFAULT_QUANTILE_TAU))
        } else {
            None
        }
    }

    pub fn with_loss_function(mut self, loss: impl Into<String>) -> Self {
        self.loss_function = loss.into();
        self
    }

    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = path.into();
        self
    }

    pub fn with_quadratic(mut self, first: impl Into<String>, second: impl Into<String>) -> Self {
        self.quadratic.push((first.into(), second.into()));
        self
    }

    pub fn with_initial_model(mut self, model: Vec<u8>) -> Self {
        self.initial_model = Some(model);
        self
    }
}

fn default_engine_path() -> PathBuf {
    PathBuf::from(engine::DEFAULT_ENGINE_BINARY)
}

fn default_loss_function() -> String {
    engine::DEFAULT_LOSS_FUNCTION.to_string()
}

fn default_bit_precision() -> u32 {
    engine::DEFAULT_BIT_PRECISION
}

fn default_input_queue_capacity() -> usize {
    engine::DEFAULT_INPUT_QUEUE_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    snapshot::DEFAULT_POLL_INTERVAL_MS
}

fn default_snapshot_timeout_ms() -> u64 {
    snapshot::DEFAULT_TIMEOUT_MS
}
