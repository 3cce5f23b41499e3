// ABOUTME: CLI ls and cat commands over the virtual file system

use anyhow::{Context, Result};
use std::io::{self, Write};

use super::{open_vfs, OutputFormat, PathArgs};
use crate::vfs::FileInfo;

/// Execute the ls command
pub fn ls(args: PathArgs, format: OutputFormat) -> Result<()> {
    let mut vfs = open_vfs()?;
    let contents = vfs
        .get_directory_contents(&args.path)
        .with_context(|| format!("Cannot list '{}'", args.path))?;

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&contents).context("Failed to serialize listing")?
            );
        }
        OutputFormat::Text => {
            for info in &contents {
                println!("{}", format_entry(info));
            }
        }
    }
    Ok(())
}

/// Execute the cat command
pub fn cat(args: PathArgs) -> Result<()> {
    let mut vfs = open_vfs()?;
    let content = vfs
        .read_bytes(&args.path)
        .with_context(|| format!("Cannot read '{}'", args.path))?;
    io::stdout().write_all(&content)?;
    Ok(())
}

fn format_entry(info: &FileInfo) -> String {
    let kind = if info.is_directory() { 'd' } else { '-' };
    let access = if info.is_writable() { "rw" } else { "r-" };
    let modified = info
        .modified
        .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(16));
    format!("{}{} {:>10} {} {}", kind, access, info.size, modified, info.name)
}
