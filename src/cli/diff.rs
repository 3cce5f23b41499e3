// ABOUTME: CLI diff command: bucketed changes and messages between revisions or dates

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use super::{open_vfs, DiffArgs, OutputFormat};
use crate::git::DiffRoot;
use crate::models::GitDiffResult;
use crate::vfs::normalize_path;

/// Parse NAME=PREFIX[,PREFIX...]
fn parse_root(spec: &str) -> Result<DiffRoot> {
    let (name, prefixes) = spec
        .split_once('=')
        .ok_or_else(|| anyhow!("Root '{}' must look like NAME=PREFIX[,PREFIX...]", spec))?;
    if name.is_empty() {
        return Err(anyhow!("Root '{}' has no name", spec));
    }
    Ok(DiffRoot::new(
        name,
        prefixes.split(',').filter(|p| !p.is_empty()),
    ))
}

fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("'{}' is not an RFC 3339 date", value))?
        .with_timezone(&Utc))
}

/// Execute the diff command
pub fn execute(args: DiffArgs, format: OutputFormat) -> Result<()> {
    let roots = args
        .roots
        .iter()
        .map(|spec| parse_root(spec))
        .collect::<Result<Vec<_>>>()?;

    let mut vfs = open_vfs()?;
    let display_path = normalize_path(&args.repository)?;
    let repo = vfs
        .repository_mut(&display_path)
        .ok_or_else(|| anyhow!("Repository '{}' is not open", args.repository))?;
    let engine = repo.diff_engine();

    let result = if args.dates {
        engine.diff_dates(
            parse_date(&args.from)?,
            parse_date(&args.to)?,
            &roots,
            args.messages,
        )?
    } else {
        engine.diff_commits(&args.from, &args.to, &roots, args.messages)?
    };

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialize diff")?
        ),
        OutputFormat::Text => print!("{}", render(&result)),
    }
    Ok(())
}

fn render(result: &GitDiffResult) -> String {
    let mut out = String::new();
    for bucket in &result.buckets {
        out.push_str(&format!("{} ({})\n", bucket.name, bucket.changes.len()));
        for change in &bucket.changes {
            out.push_str(&format!("  {:?} {}\n", change.kind, change.path));
        }
    }
    if !result.messages.is_empty() {
        out.push_str("Messages\n");
        for message in &result.messages {
            out.push_str(&format!("  - {}\n", message.lines().next().unwrap_or_default()));
        }
    }
    out
}
