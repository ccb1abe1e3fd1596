//! Error types for the deployer

use thiserror::Error;

/// Main error type for a deployment run
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("unsupported SCM type {0:?}")]
    UnsupportedScm(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Command `{command}` failed: {status}")]
    CommandFailed { command: String, status: String },

    #[error("Checkout error: {0}")]
    CheckoutError(String),

    #[error("Release error: {0}")]
    ReleaseError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}

impl From<regex::Error> for DeployError {
    fn from(err: regex::Error) -> Self {
        DeployError::Internal(format!("invalid pattern: {err}"))
    }
}
