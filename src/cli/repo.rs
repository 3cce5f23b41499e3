// ABOUTME: CLI promote and reset commands driving the branch workflow

use anyhow::{anyhow, bail, Result};

use super::{open_vfs, PromoteArgs, PromoteStep, RepositoryArgs};
use crate::git::OpenRepository;
use crate::vfs::{normalize_path, VirtualFileSystem};

fn repository<'v>(vfs: &'v mut VirtualFileSystem, folder: &str) -> Result<&'v mut OpenRepository> {
    let display_path = normalize_path(folder)?;
    vfs.repository_mut(&display_path)
        .ok_or_else(|| anyhow!("Repository '{}' is not declared or failed to open", folder))
}

/// Execute the promote command
pub fn promote(args: PromoteArgs) -> Result<()> {
    let mut vfs = open_vfs()?;
    let repo = repository(&mut vfs, &args.repository)?;

    let mut workflow = repo.workflow();
    let succeeded = match args.step {
        PromoteStep::ToLocal => workflow.switch_develop_to_local(args.auto_commit)?,
        PromoteStep::ToDevelop => workflow.switch_local_to_develop()?,
        PromoteStep::ToMaster => workflow.switch_develop_to_master()?,
        PromoteStep::FromMaster => workflow.switch_master_to_develop()?,
    };

    if !succeeded {
        bail!(
            "Promotion in '{}' stopped; fix the repository manually (see the log)",
            args.repository
        );
    }
    println!("{} is now on '{}'", args.repository, repo.current_branch()?);
    Ok(())
}

/// Execute the reset command
pub fn reset(args: RepositoryArgs) -> Result<()> {
    let mut vfs = open_vfs()?;
    let repo = repository(&mut vfs, &args.repository)?;

    if !repo.workflow().reset_hard()? {
        bail!("Reset of '{}' was incomplete (see the log)", args.repository);
    }
    println!("Reset {}", args.repository);
    Ok(())
}
