//! Error types for building rate limit clients.
//!
//! These cover construction-time problems only. Failures of an individual
//! rate limit check are reported as [`LimitStatus::Error`](crate::ratelimit::LimitStatus)
//! through the completion callback, never as a `ClientError`.

use thiserror::Error;

/// Main error type for client construction and configuration.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The rate limit service target could not be parsed as an endpoint
    #[error("Invalid rate limit service endpoint: {0}")]
    InvalidEndpoint(#[source] tonic::transport::Error),

    /// No async runtime was available to drive remote calls
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for ClientError {
    fn from(err: ::config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for ClientError {
    fn from(err: serde_yaml::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
