// ABOUTME: CLI argument parsing and command routing for gitvfs
//
// Provides command-line interface for:
// - Browsing the virtual file system (ls, cat)
// - Repository status (status)
// - Branch promotion and reset (promote, reset)
// - Release diffs (diff)

pub mod browse;
pub mod diff;
pub mod repo;
pub mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use crate::config::AppConfig;
use crate::vfs::VirtualFileSystem;

/// Browse git repositories as a file tree and drive the local/develop/master workflow
#[derive(Parser)]
#[command(name = "gitvfs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for commands
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List a directory of the virtual file system
    Ls(PathArgs),

    /// Print a file of the virtual file system
    Cat(PathArgs),

    /// Status of every declared repository
    Status,

    /// Move work between local, develop and master
    Promote(PromoteArgs),

    /// Discard every change in a repository's working tree
    Reset(RepositoryArgs),

    /// Changes and commit messages between two revisions or dates
    Diff(DiffArgs),
}

#[derive(clap::Args)]
pub struct PathArgs {
    /// Virtual path, e.g. world/app/branches/develop/src
    #[arg(default_value = "")]
    pub path: String,
}

#[derive(clap::Args)]
pub struct RepositoryArgs {
    /// Repository folder as declared in the config
    pub repository: String,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum PromoteStep {
    /// develop -> local
    ToLocal,
    /// local -> develop
    ToDevelop,
    /// develop -> master
    ToMaster,
    /// master -> develop
    FromMaster,
}

#[derive(clap::Args)]
pub struct PromoteArgs {
    /// Repository folder as declared in the config
    pub repository: String,

    #[arg(value_enum)]
    pub step: PromoteStep,

    /// Commit pending work instead of refusing to switch
    #[arg(long)]
    pub auto_commit: bool,
}

#[derive(clap::Args)]
pub struct DiffArgs {
    /// Repository folder as declared in the config
    pub repository: String,

    /// Start revision, or RFC 3339 date with --dates
    pub from: String,

    /// End revision, or RFC 3339 date with --dates
    pub to: String,

    /// Bucket definition NAME=PREFIX[,PREFIX...]; may be repeated
    #[arg(long = "root")]
    pub roots: Vec<String>,

    /// Include commit messages
    #[arg(long)]
    pub messages: bool,

    /// Interpret FROM and TO as dates
    #[arg(long)]
    pub dates: bool,
}

/// Configured file system with every declared repository opened
pub fn open_vfs() -> Result<VirtualFileSystem> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let mut vfs = VirtualFileSystem::from_config(&config)?;
    let (_opened, has_errors) = vfs.load_all();
    if has_errors {
        warn!("Some repositories could not be opened");
        eprintln!("Warning: some repositories could not be opened, see the log for details");
    }
    Ok(vfs)
}
