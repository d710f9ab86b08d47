use std::io;

use crate::publisher::PublishError;

/// Custom error type for bitbucket_gateway operations
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("error marshaling event payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("error emitting event into the event bus: {0}")]
    Publish(#[from] PublishError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParseError(#[from] toml::de::Error),
}

/// Helper type for Results that use GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;
