//! Error types for collaborator faults
//!
//! These never cross a public gateway or channel operation. They are
//! captured at the call site and carried as the cause of an
//! `OperationResult::Error`, or collapsed into a `false` for control calls.

use thiserror::Error;

/// Failures reported by a health record store.
#[derive(Error, Debug)]
pub enum HealthStoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Health store unavailable")]
    Unavailable,
}

/// Failures reported by the companion-device transport.
#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Data item write failed: {0}")]
    DataItemFailed(String),

    #[error("Operation timed out")]
    Timeout,
}

/// Failures decoding or encoding a companion data payload.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Key {key} has the wrong type (expected {expected})")]
    WrongType { key: String, expected: &'static str },

    #[error("Value for {key} out of range: {value}")]
    OutOfRange { key: String, value: i64 },
}

/// Failures loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
