//! Command line front end.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use scapi::api::auth;
use scapi::config::{self, Settings};
use scapi::format::{FormatError, Formatter, JsonFormatter, OutputFormat, TableFormatter};
use scapi::{ApiError, ApiResponse, Error, Result, ShortcutClient};

/// Keyring account used by `auth set-token`.
const KEYRING_ACCOUNT: &str = "default";

/// Command line interface for scapi
#[derive(Parser, Debug)]
#[command(name = "scapi")]
#[command(about = "Rate-limited client for the Shortcut REST API")]
#[command(version)]
pub struct Cli {
    /// Shortcut API token (defaults to SHORTCUT_API_TOKEN, then the keyring)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also log to stderr, at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// GET a resource
    Get {
        /// Path relative to the API root, e.g. /epics
        path: String,

        /// Query parameter as key=value; repeatable
        #[arg(short = 'p', long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// POST a JSON body, usually to create an entity
    Post(BodyArgs),
    /// PUT a JSON body, usually to update an entity
    Put(BodyArgs),
    /// DELETE a resource
    Delete(BodyArgs),
    /// Upload files, descending into directories
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Manage the token stored in the OS keyring
    Auth {
        #[command(subcommand)]
        action: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Store a token in the keyring
    SetToken { token: String },
    /// Remove the stored token
    Clear,
}

#[derive(Args, Debug)]
pub struct BodyArgs {
    /// Path relative to the API root
    pub path: String,

    /// JSON request body
    #[arg(short, long, default_value = "{}", value_parser = parse_json)]
    pub data: Value,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output format: response, json or table
    #[arg(short, long, default_value = "response")]
    pub format: OutputFormat,

    /// Write to this file instead of stdout; .csv, .tsv or .parquet for tables
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid key=value: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_json(s: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(s).map_err(|e| format!("invalid JSON: {}", e))
}

/// A verb call ready to send.
enum Request {
    Get {
        path: String,
        params: Vec<(String, String)>,
    },
    Post { path: String, data: Value },
    Put { path: String, data: Value },
    Delete { path: String, data: Value },
}

impl Request {
    fn send<F>(&self, client: &ShortcutClient<F>) -> Result<ApiResponse> {
        let response = match self {
            Request::Get { path, params } => {
                let params: Vec<(&str, &str)> = params
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                client.get(path, &params)?
            }
            Request::Post { path, data } => client.post(path, data)?,
            Request::Put { path, data } => client.put(path, data)?,
            Request::Delete { path, data } => client.delete(path, data)?,
        };
        Ok(response)
    }
}

/// Run the parsed command.
pub fn run(cli: Cli) -> Result<()> {
    if let Command::Auth { action } = &cli.command {
        return run_auth(action);
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    let builder = ShortcutClient::builder()
        .maybe_token(resolve_token(cli.token))
        .settings(&settings);

    let (request, output) = match cli.command {
        Command::Get {
            path,
            params,
            output,
        } => (Request::Get { path, params }, output),
        Command::Post(args) => (
            Request::Post {
                path: args.path,
                data: args.data,
            },
            args.output,
        ),
        Command::Put(args) => (
            Request::Put {
                path: args.path,
                data: args.data,
            },
            args.output,
        ),
        Command::Delete(args) => (
            Request::Delete {
                path: args.path,
                data: args.data,
            },
            args.output,
        ),
        Command::Upload { paths } => return run_upload(builder.build()?, &paths),
        Command::Auth { .. } => return Ok(()),
    };

    let path = output.output.as_deref();
    match output.format {
        OutputFormat::Response => execute(builder.build()?, &request, path),
        OutputFormat::Json => execute(builder.formatter(JsonFormatter).build()?, &request, path),
        OutputFormat::Table => execute(
            builder.formatter(TableFormatter::new()).build()?,
            &request,
            path,
        ),
    }
}

/// Pick the token from the flag, then the environment, then the keyring.
fn resolve_token(flag: Option<String>) -> Option<String> {
    flag.filter(|t| !t.trim().is_empty())
        .or_else(config::token_from_env)
        .or_else(|| {
            auth::get_token(KEYRING_ACCOUNT)
                .map(|t| t.expose().to_string())
                .ok()
        })
}

fn run_auth(action: &AuthCommand) -> Result<()> {
    match action {
        AuthCommand::SetToken { token } => {
            auth::store_token(KEYRING_ACCOUNT, token)?;
            println!("Token stored in keyring.");
        }
        AuthCommand::Clear => {
            if auth::has_token(KEYRING_ACCOUNT) {
                auth::delete_token(KEYRING_ACCOUNT)?;
                println!("Token removed from keyring.");
            } else {
                println!("No token stored.");
            }
        }
    }
    Ok(())
}

/// Send `request`, then print the formatted response or write it to `path`.
fn execute<F: Formatter>(
    client: ShortcutClient<F>,
    request: &Request,
    path: Option<&Path>,
) -> Result<()> {
    client.validate_with(|_| ())?;

    let response = request.send(&client)?;
    if !response.is_success() {
        warn!(status = %response.status(), url = response.url(), "Request failed");
        println!("{}", response.text());
        return Err(status_error(&response));
    }

    match path {
        Some(path) => {
            let size = client.write_response(path, &response)?;
            info!(path = %path.display(), size, "Wrote response");
            eprintln!("Wrote {} bytes to {}", size, path.display());
        }
        None => println!("{}", client.format_string(&response)?),
    }
    Ok(())
}

/// Error for a non-2xx response whose body was already shown to the user.
fn status_error(response: &ApiResponse) -> Error {
    ApiError::from_status(response.status(), response.url(), "").into()
}

fn run_upload(client: ShortcutClient, paths: &[PathBuf]) -> Result<()> {
    client.validate_with(|_| ())?;

    let files = expand_paths(paths);
    debug!(count = files.len(), "Expanded upload paths");
    let uploads = client.upload_files(&files)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&uploads.succeeded).map_err(FormatError::from)?
    );
    for path in &uploads.failed {
        eprintln!("Failed: {}", path.display());
    }

    if uploads.all_succeeded() {
        Ok(())
    } else {
        Err(Error::other(format!(
            "{} of {} files failed to upload",
            uploads.failed.len(),
            uploads.attempted()
        )))
    }
}

/// Replace directories with the files beneath them, sorted by path.
///
/// Paths that are not directories pass through untouched, so missing files
/// still reach the upload and show up as failures.
fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping unreadable directory entry"),
            }
        }
    }
    files
}
