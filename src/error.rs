//! Error types for the zappies-core library.
//!
//! This module provides custom error types using `thiserror` for better error
//! handling and more specific error messages throughout the application.

use thiserror::Error;

/// Authentication failures surfaced verbatim to the UI.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Email/password pair was rejected
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// An account already exists for the email
    #[error("An account with this email already exists")]
    DuplicateEmail,

    /// Password rejected by the backend's strength policy
    #[error("Password does not meet the minimum requirements")]
    WeakPassword,

    /// Any other backend auth failure, message passed through
    #[error("{0}")]
    Other(String),
}

/// Errors that can occur in the zappies-core library.
#[derive(Error, Debug)]
pub enum ZappiesError {
    /// Authentication failure from the backend
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Local precondition failure: an operation required a signed-in user
    #[error("No active session")]
    NoActiveSession,

    /// Network-level failure on a single backend call
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered with an error payload
    #[error("Backend error: {0}")]
    Backend(String),

    /// Local flag-store failure
    #[error("Local storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input failed validation before reaching the backend
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with ZappiesError
pub type Result<T> = std::result::Result<T, ZappiesError>;

impl From<config::ConfigError> for ZappiesError {
    fn from(err: config::ConfigError) -> Self {
        ZappiesError::InvalidConfig(err.to_string())
    }
}

impl From<sled::Error> for ZappiesError {
    fn from(err: sled::Error) -> Self {
        ZappiesError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ZappiesError {
    fn from(err: reqwest::Error) -> Self {
        ZappiesError::Transport(err.to_string())
    }
}
