//! scapi - command line access to the Shortcut REST API.

mod cli;

use clap::Parser;
use scapi::logging;

fn main() {
    let cli = cli::Cli::parse();

    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    if let Err(err) = cli::run(cli) {
        tracing::error!(error = %err, "Command failed");
        eprintln!("Error: {}", err.user_message());
        if let Some(action) = err.suggested_action() {
            eprintln!("  {}", action);
        }
        std::process::exit(err.exit_code());
    }
}
