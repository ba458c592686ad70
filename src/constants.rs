//! Shared constants for the vwstream adapter
//!
//! Centralizes the wire-protocol tokens, the namespace alphabet and the
//! timing defaults so the encoder, decoder and supervisor agree on them.

/// Namespace characters understood by the engine
pub mod namespaces {
    /// Character used for features that are not scoped to a named namespace
    pub const DEFAULT_NAMESPACE_CHAR: char = 'a';

    /// Characters handed out to named namespaces, in allocation order.
    /// The default character is deliberately absent.
    pub const NAMESPACE_CHARS: &str = "bcdefghijklmnopqrstuvwxyz";

    /// Maximum number of named namespaces per adapter
    pub const NAMESPACE_CAPACITY: usize = NAMESPACE_CHARS.len();
}

/// Line protocol tokens
pub mod protocol {
    /// Prefix of the correlation tag. Emitted as `'seq_<n>` on input lines
    /// and echoed back as `seq_<n>` on prediction lines.
    pub const SEQUENCE_TAG_PREFIX: &str = "seq_";

    /// Prefix of the reserved control line that asks the engine to write
    /// its current model to the path that follows
    pub const SAVE_DIRECTIVE_PREFIX: &str = "save_";

    /// Magic value for `--predictions` that makes the engine print
    /// predictions on its standard output
    pub const PREDICTIONS_TO_STDOUT: &str = "stdout";
}

/// Engine launch defaults
pub mod engine {
    /// Binary looked up on `PATH` when no explicit engine path is configured
    pub const DEFAULT_ENGINE_BINARY: &str = "vw";

    /// Default number of hash bits
    pub const DEFAULT_BIT_PRECISION: u32 = 18;

    /// Default quantile used when the quantile loss is selected without one
    pub const DEFAULT_QUANTILE_TAU: f64 = 0.5;

    /// Default loss function selector
    pub const DEFAULT_LOSS_FUNCTION: &str = "squared";

    /// Lines buffered between the caller and the engine's input pipe
    pub const DEFAULT_INPUT_QUEUE_CAPACITY: usize = 64;

    /// File name of the model the engine writes when it exits
    pub const FINAL_MODEL_FILE: &str = "final.model";

    /// File name of the warm-start model handed to the engine at launch
    pub const INITIAL_MODEL_FILE: &str = "initial.model";
}

/// Snapshot polling defaults
pub mod snapshot {
    /// Interval between file-system checks (100ms)
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

    /// Total budget for the engine to materialize a snapshot (2.5s)
    pub const DEFAULT_TIMEOUT_MS: u64 = 2500;
}
