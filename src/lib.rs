//! Streaming adapter for an external online-learning engine.
//!
//! Examples are encoded into the engine's line protocol and written to its
//! stdin; prediction lines coming back on its stdout are correlated with the
//! examples that produced them and emitted together with their loss.

pub mod cli;
pub mod codec;
pub mod config;
pub mod constants;
pub mod correlation;
pub mod error;
pub mod example;
pub mod loss;
pub mod namespace;
pub mod snapshot;
pub mod stream;
pub mod transport;

// Re-export commonly used types
pub use config::{ConfigArgs, SnapshotConfig, StreamConfig};
pub use correlation::{RunningAggregate, StreamStats};
pub use error::{Error, Result};
pub use example::{Example, Feature, Prediction};
pub use loss::LossFunction;
pub use namespace::NamespaceAllocator;
pub use stream::{ExampleSink, PredictionSource, StreamReader, StreamWriter, VwStream};
pub use transport::TransportState;
