//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Streaming JSON-lines examples through the engine
//! - Inspecting the wire encoding of examples
//! - Logging setup

pub mod commands;
pub mod handlers;

pub use handlers::{handle_encode, handle_train, init_logging};
