//! Shortcut API client and types.
//!
//! This module provides the interface for communicating with the Shortcut REST API.

pub mod auth;
mod client;
pub mod error;
pub mod rate_limit;
mod types;

pub use auth::Token;
pub use client::{ClientBuilder, ShortcutClient, BUCKET_NAME, USER_AGENT};
pub use error::ApiError;
pub use rate_limit::{Clock, ManualClock, RateLimit, RateLimiter, SystemClock};
pub use types::{ApiResponse, FileUploads, UploadFailure, UploadOutcome};
