// ABOUTME: Main entry point for the gitvfs command-line tool
//
// Binary: gitvfs
// Usage: gitvfs [--format text|json] <COMMAND>
// - ls / cat: browse head/, branches/ and remotes/ of declared repositories
// - status: one line per repository
// - promote: local/develop/master workflow steps
// - reset: discard working-tree changes
// - diff: bucketed changes between revisions or dates

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;

use gitvfs::cli::{self, Commands};
use gitvfs::config::AppConfig;

fn main() -> Result<()> {
    setup_logging();
    setup_panic_handler();

    let args = cli::Cli::parse();

    let result = match args.command {
        Commands::Ls(path) => cli::browse::ls(path, args.format),
        Commands::Cat(path) => cli::browse::cat(path),
        Commands::Status => cli::status::execute(args.format),
        Commands::Promote(promote) => cli::repo::promote(promote),
        Commands::Reset(repository) => cli::repo::reset(repository),
        Commands::Diff(diff) => cli::diff::execute(diff, args.format),
    };

    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }
    result
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    // A broken config is reported by the command itself
    let config = AppConfig::load().unwrap_or_default();
    let log_dir = config.log_dir();

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Cannot create log directory {}: {}", log_dir.display(), e);
        return;
    }

    // Create JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "gitvfs-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    let file = match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {}: {}", log_file.display(), e);
            return;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json() // Output in JSON Lines format
                .with_target(true) // Include target module in JSON
                .with_writer(file)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .init();
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs for more details.");
    }));
}
