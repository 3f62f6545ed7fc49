//! Authentication handling for the Shortcut API.
//!
//! Shortcut authenticates with a per-user API token sent in the
//! `Shortcut-Token` header. Tokens can optionally be kept in the OS keyring
//! so they don't have to live in the shell environment.

use std::fmt;

use reqwest::header::HeaderValue;

use super::error::{ApiError, Result};

/// The keyring service name for scapi tokens.
const KEYRING_SERVICE: &str = "scapi";

/// Header carrying the API token (`Shortcut-Token`), lowercased for `HeaderName`.
pub const TOKEN_HEADER: &str = "shortcut-token";

/// A Shortcut API token.
///
/// The raw value never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Header value for the `Shortcut-Token` header.
    ///
    /// Marked sensitive so reqwest doesn't print it either.
    ///
    /// # Errors
    ///
    /// Returns an error if the token contains characters not allowed in headers.
    pub fn header_value(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&self.0)
            .map_err(|e| ApiError::InvalidHeader(format!("API token is not a valid header: {}", e)))?;
        value.set_sensitive(true);
        Ok(value)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Store an API token in the OS keyring.
///
/// # Arguments
///
/// * `account` - The keyring username, e.g. a workspace name
/// * `token` - The API token to store
pub fn store_token(account: &str, token: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, account)
        .map_err(|e| ApiError::Keyring(format!("failed to create keyring entry: {}", e)))?;

    entry
        .set_password(token)
        .map_err(|e| ApiError::Keyring(format!("failed to store token: {}", e)))?;

    Ok(())
}

/// Retrieve an API token from the OS keyring.
pub fn get_token(account: &str) -> Result<Token> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, account)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .get_password()
        .map(Token::new)
        .map_err(|e| ApiError::Keyring(format!("failed to retrieve token: {}", e)))
}

/// Delete an API token from the OS keyring.
pub fn delete_token(account: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, account)
        .map_err(|e| ApiError::Keyring(format!("failed to access keyring: {}", e)))?;

    entry
        .delete_password()
        .map_err(|e| ApiError::Keyring(format!("failed to delete token: {}", e)))
}

/// Check if a token exists in the OS keyring for `account`.
pub fn has_token(account: &str) -> bool {
    get_token(account).is_ok()
}
