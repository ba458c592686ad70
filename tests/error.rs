use std::io;

use vwstream_core::error::{Error, Result};
use vwstream_core::{Example, NamespaceAllocator, StreamConfig};

#[test]
fn test_error_conversion() {
    let io_err = io::Error::new(io::ErrorKind::Other, "io error");
    let converted: Error = io_err.into();
    assert!(matches!(converted, Error::Io(_)));

    let config_err = config::ConfigError::NotFound("key".to_string());
    let converted: Error = config_err.into();
    assert!(matches!(converted, Error::Config(_)));

    let json_err = serde_json::from_str::<Example>("{").unwrap_err();
    let converted: Error = json_err.into();
    assert!(matches!(converted, Error::Serialization(_)));
}

#[test]
fn test_capacity_exceeded_surfaces_through_public_api() {
    let mut namespaces = NamespaceAllocator::new();
    let result: Result<Vec<char>> = (0..26)
        .map(|i| namespaces.allocate(Some(&format!("ns{}", i))))
        .collect();

    match result {
        Err(Error::CapacityExceeded { namespace, capacity }) => {
            assert_eq!(namespace, "ns25");
            assert_eq!(capacity, 25);
        }
        other => panic!("expected capacity error, got {:?}", other),
    }
}

#[test]
fn test_unknown_loss_function_reported_by_config() {
    let config = StreamConfig::default().with_loss_function("poisson");
    let err = config.loss().unwrap_err();
    assert!(matches!(err, Error::UnknownLossFunction(ref name) if name == "poisson"));
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn test_spawn_failure_is_not_recoverable() {
    let config = StreamConfig::default().with_engine_path("/nonexistent/engine-binary");
    let err = vwstream_core::VwStream::spawn(config).await.err().unwrap();
    assert!(matches!(err, Error::Spawn(_)));
    assert!(!err.is_recoverable());
    assert!(err.to_string().contains("/nonexistent/engine-binary"));
}
