//! Small helpers shared by the client and the formatters.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;

/// MIME type for Apache Parquet files.
///
/// The standard extension tables do not know about Parquet yet.
pub const PARQUET_MIME: &str = "application/vnd.apache.parquet";

/// Fallback MIME type for unrecognized extensions.
pub const OCTET_STREAM_MIME: &str = "application/octet-stream";

/// Ensure `path` begins with exactly one leading `/`.
pub fn prefix_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Return a copy of `map` with `key` absent.
///
/// The input is never modified; a missing key yields an equal copy.
pub fn dissoc<K, V, Q>(map: &HashMap<K, V>, key: &Q) -> HashMap<K, V>
where
    K: Eq + Hash + Clone + Borrow<Q>,
    V: Clone,
    Q: Eq + Hash + ?Sized,
{
    let mut copy = map.clone();
    copy.remove(key);
    copy
}

/// Guess the MIME type of a file from its extension.
///
/// Returns [`OCTET_STREAM_MIME`] when the extension is unknown.
pub fn guess_mime_type(file_name: impl AsRef<Path>) -> String {
    let path = file_name.as_ref();

    let is_parquet = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("parquet"));
    if is_parquet {
        return PARQUET_MIME.to_string();
    }

    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM_MIME)
        .to_string()
}
