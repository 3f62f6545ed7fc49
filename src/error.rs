//! Centralized error types for scapi.
//!
//! Each layer has its own error enum; [`Error`] aggregates them for callers
//! that drive the whole stack, like the command-line front end.

use thiserror::Error;

use crate::api::error::ApiError;
use crate::config::ConfigError;
use crate::format::FormatError;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// API-related errors.
    #[error("{0}")]
    Api(#[from] ApiError),

    /// Formatting errors.
    #[error("{0}")]
    Format(#[from] FormatError),

    /// IO errors (file system, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with a message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Get a user-friendly message for display.
    pub fn user_message(&self) -> String {
        match self {
            Error::Config(e) => match e {
                ConfigError::NoConfigDir => {
                    "Could not find configuration directory. Please check your system settings."
                        .to_string()
                }
                ConfigError::ReadError(_) => {
                    "Could not read configuration file. Please check the file exists and is readable.".to_string()
                }
                ConfigError::ParseError(_) => {
                    "Configuration file is invalid. Please check the file format.".to_string()
                }
                ConfigError::ValidationError(msg) => format!("Configuration error: {}", msg),
                ConfigError::MissingToken(_) => "No Shortcut API token was provided.".to_string(),
            },
            Error::Api(e) => match e {
                ApiError::RateLimitExceeded { .. } => {
                    "Too many requests. Please wait a minute and try again.".to_string()
                }
                ApiError::Status { status, .. } => format!("Shortcut returned HTTP {}.", status),
                ApiError::Network(_) => {
                    "Connection failed. Please check your internet connection.".to_string()
                }
                ApiError::Io(err) => format!("Could not read a local file: {}", err),
                ApiError::InvalidHeader(_) => {
                    "The API token contains invalid characters.".to_string()
                }
                ApiError::InvalidResponse(_) => {
                    "Unexpected response from Shortcut. Please try again.".to_string()
                }
                ApiError::Keyring(_) => {
                    "Could not access secure storage for the API token.".to_string()
                }
            },
            Error::Format(e) => format!("Could not format the response: {}", e),
            Error::Io(_) => "A file operation failed. Please check file permissions.".to_string(),
            Error::Other(msg) => msg.clone(),
        }
    }

    /// Get a suggested action for the user.
    pub fn suggested_action(&self) -> Option<&'static str> {
        match self {
            Error::Config(ConfigError::MissingToken(_)) | Error::Api(ApiError::Keyring(_)) => Some(
                "Set SHORTCUT_API_TOKEN, pass --token, or run 'scapi auth set-token <TOKEN>'.",
            ),
            Error::Api(ApiError::Status { status, .. }) if status.as_u16() == 401 => {
                Some("Check your API token at https://app.shortcut.com/settings/account/api-tokens")
            }
            Error::Api(ApiError::RateLimitExceeded { .. }) => {
                Some("Lower rate_limit.max_requests or raise rate_limit.max_delay_secs in config.toml.")
            }
            Error::Api(ApiError::Network(_)) => Some("Check your internet connection and base_url."),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Result type for crate-wide operations.
pub type Result<T> = std::result::Result<T, Error>;
