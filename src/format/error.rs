//! Formatter error types.

use thiserror::Error;

/// Errors raised while shaping or writing a response.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The response body is not valid JSON.
    #[error("Response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoded JSON can't be turned into a table.
    #[error("Cannot build a table from {0}")]
    UnsupportedShape(String),

    /// CSV/TSV encoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow conversion failed.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Parquet encoding failed.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Writing the output file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for formatter operations.
pub type Result<T> = std::result::Result<T, FormatError>;
