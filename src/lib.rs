//! scapi - a small client for the Shortcut v3 REST API.
//!
//! The [`ShortcutClient`] sends authenticated requests through a local
//! [`RateLimiter`] that keeps callers under Shortcut's 200 requests per
//! minute, and can reshape responses with a [`Formatter`]: passed through,
//! decoded as JSON, or flattened into a [`Table`] for CSV, TSV or Parquet
//! output.
//!
//! ```no_run
//! use scapi::{config, ShortcutClient};
//!
//! let client = ShortcutClient::new(config::token_from_env())?;
//! client.validate()?;
//! let member: serde_json::Value = client.get_json("member", &[])?;
//! # Ok::<(), scapi::Error>(())
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod util;

pub use api::{ApiError, ApiResponse, FileUploads, RateLimit, RateLimiter, ShortcutClient};
pub use error::{Error, Result};
pub use format::{Formatter, JsonFormatter, OutputFormat, ResponseFormatter, Table, TableFormatter};
