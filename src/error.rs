//! Error types for the vwstream adapter.

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;
use std::result;
use std::time::Duration;

/// A specialized Result type for adapter operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for adapter operations.
#[derive(Debug)]
pub enum Error {
    /// More distinct namespaces than the wire alphabet can represent
    CapacityExceeded { namespace: String, capacity: usize },
    /// Loss function selector that the evaluator does not know
    UnknownLossFunction(String),
    /// Prediction line carrying a sequence number with no pending example
    UnknownSequenceNumber(u64),
    /// The engine did not materialize a snapshot within the budget
    SnapshotTimeout { path: PathBuf, waited: Duration },
    /// Example or directive sent after the input channel was closed
    TransportClosedWrite,
    /// Engine process could not be launched
    Spawn(String),
    /// I/O errors
    Io(std::io::Error),
    /// Configuration errors
    Config(String),
    /// Serialization/deserialization errors
    Serialization(String),
}

impl Error {
    /// Whether the caller may keep using the adapter after this error.
    ///
    /// Protocol desync and snapshot timeouts leave the stream intact; every
    /// other variant indicates a configuration or programming error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnknownSequenceNumber(_) | Error::SnapshotTimeout { .. }
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExceeded { namespace, capacity } => write!(
                f,
                "Too many namespaces: cannot map '{}', all {} namespace characters are in use",
                namespace, capacity
            ),
            Error::UnknownLossFunction(name) => write!(f, "Unrecognized loss function: {}", name),
            Error::UnknownSequenceNumber(seq) => {
                write!(f, "Prediction for unknown sequence number: {}", seq)
            }
            Error::SnapshotTimeout { path, waited } => write!(
                f,
                "Engine never saved live model to {} (waited {}ms)",
                path.display(),
                waited.as_millis()
            ),
            Error::TransportClosedWrite => {
                write!(f, "Attempt to send to engine after its input was closed")
            }
            Error::Spawn(msg) => write!(f, "Failed to launch engine: {}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_taxonomy() {
        assert!(Error::UnknownSequenceNumber(7).is_recoverable());
        assert!(Error::SnapshotTimeout {
            path: PathBuf::from("/tmp/x"),
            waited: Duration::from_millis(2500),
        }
        .is_recoverable());

        assert!(!Error::TransportClosedWrite.is_recoverable());
        assert!(!Error::UnknownLossFunction("poisson".into()).is_recoverable());
        assert!(!Error::CapacityExceeded {
            namespace: "z".into(),
            capacity: 25,
        }
        .is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::UnknownLossFunction("poisson".into());
        assert_eq!(err.to_string(), "Unrecognized loss function: poisson");

        let err = Error::UnknownSequenceNumber(42);
        assert_eq!(err.to_string(), "Prediction for unknown sequence number: 42");
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.source().is_some());
    }
}
