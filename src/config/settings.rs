//! Client settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{config_file_path, ConfigError, Result};
use crate::api::rate_limit::{RateLimit, RateLimiter, DEFAULT_MAX_DELAY, DEFAULT_MAX_REQUESTS};

/// Versioned root of the Shortcut REST API.
pub const DEFAULT_BASE_URL: &str = "https://api.app.shortcut.com/api/v3";

/// Default network timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Network timeout per request, in seconds.
    pub timeout_secs: u64,
    /// Local rate limit.
    pub rate_limit: RateLimitSettings,
}

/// Rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Permits per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub interval_secs: u64,
    /// Longest wait for a permit, in seconds.
    pub max_delay_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            interval_secs: 60,
            max_delay_secs: DEFAULT_MAX_DELAY.as_secs(),
        }
    }
}

impl Settings {
    /// Load settings from the default config file, falling back to defaults
    /// when the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = config_file_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate settings from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Validate these settings.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError::ValidationError` if the base URL is not an
    /// http(s) URL or any limit is zero.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url cannot be empty".to_string(),
            ));
        }

        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(ConfigError::ValidationError(format!(
                "base_url '{}' must start with http:// or https://",
                self.base_url
            )));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit.max_requests and rate_limit.interval_secs must be greater than zero"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl RateLimitSettings {
    pub fn rate(&self) -> RateLimit {
        RateLimit::new(self.max_requests, Duration::from_secs(self.interval_secs))
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }

    /// Build a limiter with these settings on the system clock.
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(self.rate(), self.max_delay())
    }
}
