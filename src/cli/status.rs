// ABOUTME: CLI status command showing every open repository

use anyhow::{Context, Result};

use super::{open_vfs, OutputFormat};

/// Execute the status command
pub fn execute(format: OutputFormat) -> Result<()> {
    let vfs = open_vfs()?;
    let statuses = vfs.status();

    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&statuses).context("Failed to serialize status")?
            );
        }
        OutputFormat::Text => {
            if statuses.is_empty() {
                println!("No repositories open. Declare them under [[repositories]] in the config.");
            }
            for status in &statuses {
                println!("{}", status.summary());
            }
        }
    }
    Ok(())
}
