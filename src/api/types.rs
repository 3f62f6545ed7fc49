//! Response and upload result types.

use std::borrow::Cow;
use std::path::PathBuf;

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::{ApiError, Result};

/// A fully-read HTTP response.
///
/// The body is buffered when the response arrives, so it can be logged,
/// inspected and formatted any number of times.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    url: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, url: impl Into<String>, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self {
            status,
            url: url.into(),
            headers,
            body,
        }
    }

    /// Read a blocking reqwest response to completion.
    pub(crate) fn read(response: reqwest::blocking::Response) -> Result<Self> {
        let status = response.status();
        let url = response.url().to_string();
        let headers = response.headers().clone();
        let body = response.bytes()?.to_vec();
        Ok(Self::new(status, url, headers, body))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", self.url, e))
        })
    }

    /// Turn a non-2xx response into [`ApiError::Status`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.url, &self.text()))
        }
    }
}

/// Why a single file in an upload batch failed.
#[derive(Debug)]
pub enum UploadFailure {
    /// The file could not be opened or read; nothing was sent.
    Read(std::io::Error),
    /// The request could not be completed.
    Transport(ApiError),
    /// The server answered with a non-2xx status.
    Status(StatusCode),
    /// The server answered 2xx but without a file entity.
    InvalidResponse(String),
    /// The rate limiter ran out of permits at or before this file; nothing was sent.
    RateLimited,
}

/// Outcome of uploading one file.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The file was created; `entity` is the first element of the response array.
    Uploaded { path: PathBuf, entity: Value },
    /// The file was not uploaded.
    Failed { path: PathBuf, reason: UploadFailure },
}

/// Results of an upload batch.
///
/// Every attempted file ends up in exactly one of `succeeded` or `failed`.
/// `responses` holds every response received, including failed ones.
#[derive(Debug, Default)]
pub struct FileUploads {
    /// Raw responses, one per request that reached the server.
    pub responses: Vec<ApiResponse>,
    /// File entities created by Shortcut. Their `id`s can be passed as `file_ids` on stories.
    pub succeeded: Vec<Value>,
    /// Paths of files that failed.
    pub failed: Vec<PathBuf>,
}

impl FileUploads {
    /// Fold one file's outcome into the batch.
    pub fn record(&mut self, outcome: UploadOutcome) {
        match outcome {
            UploadOutcome::Uploaded { entity, .. } => self.succeeded.push(entity),
            UploadOutcome::Failed { path, .. } => self.failed.push(path),
        }
    }

    /// Number of files attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}
