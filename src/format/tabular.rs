//! Table-shaped output for list responses.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use super::error::Result;
use super::table::Table;
use super::{write_bytes, Formatter};
use crate::api::ApiResponse;
use crate::util::{guess_mime_type, PARQUET_MIME};

const TSV_MIME: &str = "text/tab-separated-values";

/// Formats responses as a [`Table`] with array fields exploded.
#[derive(Debug, Clone, Copy)]
pub struct TableFormatter {
    flatten: bool,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self { flatten: true }
    }

    /// Keep array fields as-is instead of exploding them.
    pub fn without_flattening() -> Self {
        Self { flatten: false }
    }

    fn table(&self, response: &ApiResponse) -> Result<Table> {
        let value: Value = serde_json::from_slice(response.bytes())?;
        let table = Table::from_json(&value)?;
        Ok(if self.flatten { table.flatten() } else { table })
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter for TableFormatter {
    type Object = Table;

    fn as_object(&self, response: &ApiResponse) -> Result<Table> {
        self.table(response)
    }

    fn as_string(&self, response: &ApiResponse) -> Result<String> {
        Ok(self.table(response)?.to_string())
    }

    /// Pick the encoding from the file extension: Parquet, TSV, or CSV for
    /// anything else.
    ///
    /// The whole file is encoded before `path` is created, so a failure
    /// leaves nothing on disk.
    fn write_to_file(&self, path: &Path, response: &ApiResponse) -> Result<u64> {
        let table = self.table(response)?;
        let mime_type = guess_mime_type(path);
        debug!(path = %path.display(), mime_type = %mime_type, rows = table.len(), "Writing table");

        let mut encoded = Vec::new();
        match mime_type.as_str() {
            PARQUET_MIME => table.write_parquet(&mut encoded)?,
            TSV_MIME => table.write_csv(&mut encoded, b'\t')?,
            _ => table.write_csv(&mut encoded, b',')?,
        }

        write_bytes(path, &encoded)
    }
}
