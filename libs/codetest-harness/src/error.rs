//! Harness-side failures.
//!
//! These never describe the candidate program; anything the candidate does
//! wrong is reported through [`crate::engine::Evaluation`] instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// The interpreter could not be constructed (missing binary, daemon down)
    #[error("Failed to create execution context: {0}")]
    ContextCreation(String),

    #[error("I/O error while talking to the interpreter: {0}")]
    Io(#[from] std::io::Error),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// The interpreter finished but its report could not be decoded
    #[error("Malformed interpreter report: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(#[from] codetest_common::config::ConfigError),

    /// A panic escaped while evaluating a case
    #[error("Internal panic: {0}")]
    Panic(String),
}
