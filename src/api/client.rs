//! Shortcut API client implementation.
//!
//! This module provides the main client for the Shortcut REST API v3.
//! Every request goes through the client's [`RateLimiter`] first, carries the
//! fixed JSON header set plus the `Shortcut-Token` header, and is logged at
//! debug level along with its response.
//!
//! Plain verb calls ([`ShortcutClient::get`], [`ShortcutClient::post`], ...)
//! return the response whatever its status; the `*_json` helpers turn
//! non-2xx statuses into [`ApiError::Status`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use super::auth::{Token, TOKEN_HEADER};
use super::error::{ApiError, Result};
use super::rate_limit::RateLimiter;
use super::types::{ApiResponse, FileUploads, UploadFailure, UploadOutcome};
use crate::config::{self, ConfigError, Settings, TOKEN_ENV_VAR};
use crate::format::{self, Formatter, ResponseFormatter};
use crate::util::{dissoc, guess_mime_type, prefix_slash};

/// Rate limit bucket shared by every request from one client.
pub const BUCKET_NAME: &str = "shortcut-api-request";

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("scapi/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Endpoint for file uploads.
const FILES_PATH: &str = "/files";

/// Multipart field name Shortcut expects for uploaded files.
const UPLOAD_FIELD: &str = "file0";

/// Headers sent with every JSON request, token excluded.
fn json_headers() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("accept", "application/json; charset=utf-8"),
        ("content-type", "application/json"),
        ("user-agent", USER_AGENT),
    ])
}

/// Headers for multipart uploads: reqwest sets the multipart content type.
fn upload_headers() -> HashMap<&'static str, &'static str> {
    let mut headers = dissoc(&json_headers(), "content-type");
    headers.insert("accept", "application/json");
    headers
}

/// Default failure callback for [`ShortcutClient::validate`].
fn exit_fail(_: &ConfigError) {
    std::process::exit(1);
}

/// The Shortcut API client.
///
/// Generic over the [`Formatter`] used by [`ShortcutClient::format_string`]
/// and friends; the default passes responses through untouched.
#[derive(Debug)]
pub struct ShortcutClient<F = ResponseFormatter> {
    /// The HTTP client.
    http: Client,
    /// API root without a trailing slash.
    base_url: String,
    /// API token, checked by [`ShortcutClient::validate`].
    token: Option<Token>,
    /// Rate limiter, possibly shared with other clients.
    limiter: Arc<RateLimiter>,
    /// Response formatter.
    formatter: F,
}

/// Builder for [`ShortcutClient`].
#[derive(Debug)]
pub struct ClientBuilder<F = ResponseFormatter> {
    token: Option<Token>,
    base_url: String,
    timeout: Duration,
    limiter: Option<Arc<RateLimiter>>,
    formatter: F,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            token: None,
            base_url: config::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            limiter: None,
            formatter: ResponseFormatter,
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> ClientBuilder<F> {
    /// Set the API token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(Token::new(token));
        self
    }

    /// Set or clear the API token.
    pub fn maybe_token(mut self, token: Option<String>) -> Self {
        self.token = token.map(Token::new);
        self
    }

    /// Override the API root, e.g. to point at a test server.
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    /// Network timeout per request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use `limiter` instead of a fresh default one.
    ///
    /// Clients built with the same `Arc` share one quota.
    pub fn limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Apply base URL, timeout and rate limit from `settings`.
    pub fn settings(self, settings: &Settings) -> Self {
        let limiter = Arc::new(settings.rate_limit.limiter());
        self.base_url(&settings.base_url)
            .timeout(settings.timeout())
            .limiter(limiter)
    }

    /// Swap the response formatter.
    pub fn formatter<G: Formatter>(self, formatter: G) -> ClientBuilder<G> {
        ClientBuilder {
            token: self.token,
            base_url: self.base_url,
            timeout: self.timeout,
            limiter: self.limiter,
            formatter,
        }
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn build(self) -> Result<ShortcutClient<F>> {
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ApiError::Network)?;

        Ok(ShortcutClient {
            http,
            base_url: normalize_base_url(&self.base_url),
            token: self.token,
            limiter: self.limiter.unwrap_or_default(),
            formatter: self.formatter,
        })
    }
}

impl ShortcutClient {
    /// Start building a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client with default settings and its own rate limiter.
    pub fn new(token: Option<String>) -> Result<Self> {
        Self::builder().maybe_token(token).build()
    }
}

impl<F> ShortcutClient<F> {
    /// Check that the client is usable, exiting the process if it isn't.
    ///
    /// See [`ShortcutClient::validate_with`] to handle failure differently.
    pub fn validate(&self) -> config::Result<&Self> {
        self.validate_with(exit_fail)
    }

    /// Check that the client is usable.
    ///
    /// On failure the problems are logged, `on_failure` is called once with
    /// the error, and the error is returned. On success the client itself
    /// is returned so calls can be chained.
    pub fn validate_with<C>(&self, on_failure: C) -> config::Result<&Self>
    where
        C: FnOnce(&ConfigError),
    {
        let mut problems: Vec<String> = Vec::new();
        if self.token.is_none() {
            problems.push(format!(
                " - You must provide a Shortcut API token. Either pass one to the client builder or define a {} environment variable.",
                TOKEN_ENV_VAR
            ));
        }

        if problems.is_empty() {
            return Ok(self);
        }

        let err = ConfigError::MissingToken(problems.join("\n"));
        error!("{}", err);
        on_failure(&err);
        Err(err)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn formatter(&self) -> &F {
        &self.formatter
    }

    /// Full URL for `path`, which gets a leading `/` if it lacks one.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, prefix_slash(path))
    }

    /// Make an HTTP GET call, serializing `params` as URL query parameters.
    #[instrument(skip(self, params))]
    pub fn get(&self, path: &str, params: &[(&str, &str)]) -> Result<ApiResponse> {
        self.request(Method::GET, path, params, None::<&()>)
    }

    /// GET and decode the body, failing on non-2xx statuses.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T> {
        self.get(path, params)?.error_for_status()?.json()
    }

    /// Make an HTTP POST call with `body` serialized as JSON.
    ///
    /// Typically used to create an entity. Expensive searches that need
    /// consistent parameter serialization also use POST.
    #[instrument(skip(self, body))]
    pub fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.request(Method::POST, path, &[], Some(body))
    }

    /// POST and decode the body, failing on non-2xx statuses.
    pub fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post(path, body)?.error_for_status()?.json()
    }

    /// Make an HTTP PUT call with `body` serialized as JSON.
    ///
    /// Typically used to update an entity.
    #[instrument(skip(self, body))]
    pub fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.request(Method::PUT, path, &[], Some(body))
    }

    /// PUT and decode the body, failing on non-2xx statuses.
    pub fn put_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.put(path, body)?.error_for_status()?.json()
    }

    /// Make an HTTP DELETE call with `body` serialized as JSON.
    #[instrument(skip(self, body))]
    pub fn delete<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, &[], Some(body))
    }

    /// Acquire a permit, then send one JSON request.
    fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<ApiResponse> {
        self.limiter.acquire(BUCKET_NAME, 1)?;

        let url = self.url(path);
        let base_headers = json_headers();
        let body_json = body.map(serde_json::to_string).transpose().map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to serialize request body: {}", e))
        })?;
        debug!(
            "{} url={} params={:?} body={} headers={:?}",
            method,
            url,
            params,
            body_json.as_deref().unwrap_or(""),
            base_headers
        );

        let mut request = self
            .http
            .request(method.clone(), &url)
            .headers(self.header_map(&base_headers)?);
        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(body_json) = body_json {
            request = request.body(body_json);
        }

        let response = self.execute(request)?;
        debug!("{} response: {} {}", method, response.status(), response.text());
        Ok(response)
    }

    fn execute(&self, request: RequestBuilder) -> Result<ApiResponse> {
        let response = request.send()?;
        ApiResponse::read(response)
    }

    /// Convert a header table to a `HeaderMap`, adding the token.
    fn header_map(&self, headers: &HashMap<&'static str, &'static str>) -> Result<HeaderMap> {
        let mut map = HeaderMap::with_capacity(headers.len() + 1);
        for (name, value) in headers {
            map.insert(HeaderName::from_static(*name), HeaderValue::from_static(*value));
        }
        if let Some(token) = &self.token {
            map.insert(HeaderName::from_static(TOKEN_HEADER), token.header_value()?);
        }
        Ok(map)
    }

    /// Upload the files at `files`.
    ///
    /// Each file is sent in its own multipart request. Failures are isolated
    /// per file: an unreadable file, a transport error or a non-2xx status
    /// puts the path in `failed` and the batch moves on. The `succeeded`
    /// entities carry the ids to pass as `file_ids` on stories.
    ///
    /// Once the rate limiter refuses a permit, that file and every file after
    /// it fail with [`UploadFailure::RateLimited`] without being sent. Files
    /// uploaded before that point stay in `succeeded`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the token cannot be turned into a header.
    #[instrument(skip(self, files), fields(count = files.len()))]
    pub fn upload_files<P: AsRef<Path>>(&self, files: &[P]) -> Result<FileUploads> {
        let url = self.url(FILES_PATH);
        let base_headers = upload_headers();
        let paths: Vec<&Path> = files.iter().map(AsRef::as_ref).collect();
        debug!(
            "UPLOAD FILES url={} files={:?} headers={:?}",
            url, paths, base_headers
        );

        let headers = self.header_map(&base_headers)?;
        let mut uploads = FileUploads::default();
        let mut exhausted = false;
        for path in paths {
            let outcome = if exhausted {
                UploadOutcome::Failed {
                    path: path.to_path_buf(),
                    reason: UploadFailure::RateLimited,
                }
            } else {
                match self.upload_file(&url, &headers, path, &mut uploads.responses) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, "Rate limit reached, skipping remaining uploads");
                        exhausted = true;
                        UploadOutcome::Failed {
                            path: path.to_path_buf(),
                            reason: UploadFailure::RateLimited,
                        }
                    }
                }
            };
            if let UploadOutcome::Failed { path, reason } = &outcome {
                error!(path = %path.display(), reason = ?reason, "Failed to upload file");
            }
            uploads.record(outcome);
        }

        info!(
            succeeded = uploads.succeeded.len(),
            failed = uploads.failed.len(),
            "Upload batch finished"
        );
        Ok(uploads)
    }

    /// Upload one file, pushing any response received onto `responses`.
    ///
    /// Fails only when the rate limiter refuses a permit.
    fn upload_file(
        &self,
        url: &str,
        headers: &HeaderMap,
        path: &Path,
        responses: &mut Vec<ApiResponse>,
    ) -> Result<UploadOutcome> {
        let failed = |reason| UploadOutcome::Failed {
            path: path.to_path_buf(),
            reason,
        };

        // Read before acquiring so unreadable files cost nothing
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) => return Ok(failed(UploadFailure::Read(e))),
        };
        let mime_type = guess_mime_type(path);
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("File: {} {}", path.display(), mime_type);

        let part = match multipart::Part::bytes(contents)
            .file_name(file_name)
            .mime_str(&mime_type)
        {
            Ok(part) => part,
            Err(e) => return Ok(failed(UploadFailure::Transport(e.into()))),
        };
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        self.limiter.acquire(BUCKET_NAME, 1)?;

        let request = self.http.post(url).headers(headers.clone()).multipart(form);
        let response = match self.execute(request) {
            Ok(response) => response,
            Err(e) => return Ok(failed(UploadFailure::Transport(e))),
        };
        debug!(
            "UPLOAD FILES response: {} {}",
            response.status(),
            response.text()
        );

        let outcome = if !response.is_success() {
            failed(UploadFailure::Status(response.status()))
        } else {
            match response.json::<Vec<Value>>() {
                Ok(mut entities) if !entities.is_empty() => UploadOutcome::Uploaded {
                    path: path.to_path_buf(),
                    entity: entities.swap_remove(0),
                },
                Ok(_) => failed(UploadFailure::InvalidResponse(
                    "no file entity in response".to_string(),
                )),
                Err(e) => failed(UploadFailure::InvalidResponse(e.to_string())),
            }
        };
        responses.push(response);
        Ok(outcome)
    }
}

impl<F: Formatter> ShortcutClient<F> {
    /// Object representation of `response` per the client's formatter.
    pub fn format_object(&self, response: &ApiResponse) -> format::Result<F::Object> {
        self.formatter.as_object(response)
    }

    /// String representation of `response` per the client's formatter.
    pub fn format_string(&self, response: &ApiResponse) -> format::Result<String> {
        self.formatter.as_string(response)
    }

    /// Write `response` to `path` per the client's formatter.
    pub fn write_response(&self, path: &Path, response: &ApiResponse) -> format::Result<u64> {
        self.formatter.write_to_file(path, response)
    }
}

/// Normalize the base URL by removing trailing slashes.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');

    // Warn if not HTTPS (but don't enforce for local test servers)
    if !url.starts_with("https://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
        warn!("URL does not use HTTPS: {}. This is insecure for production use.", url);
    }

    url.to_string()
}
