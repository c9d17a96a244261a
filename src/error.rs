//! Error types for the Linkgate service.

use thiserror::Error;

use crate::credential::CredentialError;

/// Main error type for Linkgate startup and configuration.
#[derive(Error, Debug)]
pub enum LinkgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credential codec errors
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Linkgate operations.
pub type Result<T> = std::result::Result<T, LinkgateError>;
