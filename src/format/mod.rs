//! Response formatting.
//!
//! A [`Formatter`] turns an [`ApiResponse`] into an in-memory object, a
//! string, or a file. There are three implementations:
//!
//! - [`ResponseFormatter`] passes the response through untouched
//! - [`JsonFormatter`] decodes the body as JSON
//! - [`TableFormatter`] builds a flattened [`Table`] and can write CSV, TSV
//!   or Parquet depending on the destination's extension
//!
//! The formatter is chosen when the client is constructed.

mod error;
pub mod table;
mod tabular;

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;

use crate::api::ApiResponse;

pub use error::{FormatError, Result};
pub use table::{Table, ARRAY_FIELDS};
pub use tabular::TableFormatter;

/// Shapes API responses.
pub trait Formatter {
    /// In-memory representation produced by [`Formatter::as_object`].
    type Object;

    /// Object representation of the response.
    fn as_object(&self, response: &ApiResponse) -> Result<Self::Object>;

    /// String representation of the response.
    fn as_string(&self, response: &ApiResponse) -> Result<String>;

    /// Write the response to `path`, returning the number of bytes written.
    fn write_to_file(&self, path: &Path, response: &ApiResponse) -> Result<u64>;
}

/// Write `bytes` to a freshly created file at `path`.
fn write_bytes(path: &Path, bytes: &[u8]) -> Result<u64> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(bytes.len() as u64)
}

/// Passes responses through as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseFormatter;

impl Formatter for ResponseFormatter {
    type Object = ApiResponse;

    fn as_object(&self, response: &ApiResponse) -> Result<ApiResponse> {
        Ok(response.clone())
    }

    fn as_string(&self, response: &ApiResponse) -> Result<String> {
        Ok(response.text().into_owned())
    }

    fn write_to_file(&self, path: &Path, response: &ApiResponse) -> Result<u64> {
        let text = self.as_string(response)?;
        write_bytes(path, text.as_bytes())
    }
}

/// Decodes response bodies as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    type Object = Value;

    fn as_object(&self, response: &ApiResponse) -> Result<Value> {
        Ok(serde_json::from_slice(response.bytes())?)
    }

    fn as_string(&self, response: &ApiResponse) -> Result<String> {
        Ok(response.text().into_owned())
    }

    fn write_to_file(&self, path: &Path, response: &ApiResponse) -> Result<u64> {
        // Shortcut v3 responses are always JSON, so the body is written verbatim
        write_bytes(path, response.bytes())
    }
}

/// The closed set of formatters, for choosing one by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Response,
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "response" | "raw" => Ok(OutputFormat::Response),
            "json" => Ok(OutputFormat::Json),
            "table" => Ok(OutputFormat::Table),
            other => Err(format!(
                "unknown format '{}', expected one of: response, json, table",
                other
            )),
        }
    }
}
