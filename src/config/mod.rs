//! Configuration management for scapi.
//!
//! Settings live in an optional TOML file; the API token comes from the
//! caller, typically read once from `SHORTCUT_API_TOKEN` at startup.

mod settings;

use std::path::PathBuf;

use thiserror::Error;

pub use settings::{RateLimitSettings, Settings, DEFAULT_BASE_URL};

/// Environment variable holding the default API token.
pub const TOKEN_ENV_VAR: &str = "SHORTCUT_API_TOKEN";

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform configuration directory.
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// Failed to read the settings file.
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),

    /// The settings file is not valid TOML for [`Settings`].
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A setting has an invalid value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// No API token was provided.
    #[error("Client did not validate:\n{0}")]
    MissingToken(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Default location of the settings file: `<config_dir>/scapi/config.toml`.
pub fn config_file_path() -> Result<PathBuf> {
    let base_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base_dir.join("scapi").join("config.toml"))
}

/// Read the API token from [`TOKEN_ENV_VAR`].
///
/// Empty values count as unset.
pub fn token_from_env() -> Option<String> {
    std::env::var(TOKEN_ENV_VAR)
        .ok()
        .filter(|token| !token.trim().is_empty())
}
