// ABOUTME: local/develop/master promotion state machine on top of the plumbing
// The checked-out branch is the state; branch names come from WorkflowConfig

use git2::{ErrorCode, ResetType, Status, StatusOptions};
use std::fs;
use tracing::{error, info, warn};

use crate::config::WorkflowConfig;
use crate::events::LifecycleEvent;
use crate::git::{CommitBehavior, CommitResult, GitError, MergeFavor, OpenRepository};
use crate::monitor;

/// Promotion operations borrowing one repository exclusively
pub struct BranchWorkflow<'r> {
    repo: &'r mut OpenRepository,
}

impl OpenRepository {
    pub fn workflow(&mut self) -> BranchWorkflow<'_> {
        BranchWorkflow { repo: self }
    }
}

impl<'r> BranchWorkflow<'r> {
    fn names(&self) -> WorkflowConfig {
        self.repo.settings.workflow.clone()
    }

    /// Bring develop's work onto the scratch branch, checking it out if needed
    pub fn switch_develop_to_local(&mut self, auto_commit: bool) -> Result<bool, GitError> {
        let names = self.names();
        let _group = monitor::open_group("develop -> local");

        if self.repo.current_branch()? == names.local_branch {
            self.repo.plugins.rebind(&names.local_branch);
            return self.merge_into_current(&names.develop_branch, MergeFavor::Ours);
        }

        if !self.ensure_committed(auto_commit, &names)? {
            return Ok(false);
        }

        // A fresh local branch already has develop's content
        let favor = if self.repo.branch_exists(&names.local_branch)? {
            MergeFavor::Theirs
        } else {
            let head = self
                .repo
                .head_commit()?
                .map(|commit| commit.id())
                .ok_or_else(|| GitError::InvalidState("no commit to branch from".to_string()))?;
            self.repo.create_branch_at(&names.local_branch, head)?;
            MergeFavor::Ours
        };

        if !self.repo.checkout(&names.local_branch, true, true)?.success {
            return Ok(false);
        }
        if !self
            .repo
            .raise_event(LifecycleEvent::LocalBranchEntered, &names.local_branch)
        {
            return Ok(false);
        }

        if !self.merge_into_current(&names.develop_branch, favor)? {
            return Ok(false);
        }
        self.collapse_tip()
    }

    /// Promote the scratch branch's work onto develop
    pub fn switch_local_to_develop(&mut self) -> Result<bool, GitError> {
        let names = self.names();
        let _group = monitor::open_group("local -> develop");

        if self.repo.current_branch()? == names.local_branch {
            if !self
                .repo
                .raise_event(LifecycleEvent::LocalBranchLeaving, &names.local_branch)
            {
                return Ok(false);
            }
            let amended = self.repo.commit(
                &names.auto_commit_message,
                CommitBehavior::AmendIfPossibleKeepMessage,
            )?;
            if amended == CommitResult::Error {
                return Ok(false);
            }
            if !self.repo.checkout(&names.develop_branch, true, true)?.success {
                return Ok(false);
            }
            return self.merge_into_current(&names.local_branch, MergeFavor::Theirs);
        }

        if !self.require_clean("merge local into develop")? {
            return Ok(false);
        }
        if !self.repo.checkout(&names.develop_branch, true, true)?.success {
            return Ok(false);
        }
        self.merge_into_current(&names.local_branch, MergeFavor::Ours)
    }

    /// Release develop to master, creating master from develop's tip on first use
    pub fn switch_develop_to_master(&mut self) -> Result<bool, GitError> {
        let names = self.names();
        let _group = monitor::open_group("develop -> master");

        if !self.require_clean("release develop")? {
            return Ok(false);
        }
        if !self.repo.branch_exists(&names.master_branch)? {
            let develop = self.repo.branch_tip(&names.develop_branch)?.ok_or_else(|| {
                GitError::NotFound(format!("branch '{}'", names.develop_branch))
            })?;
            self.repo.create_branch_at(&names.master_branch, develop)?;
        }
        if !self.repo.checkout(&names.master_branch, true, true)?.success {
            return Ok(false);
        }
        self.merge_into_current(&names.develop_branch, MergeFavor::Theirs)
    }

    /// Bring master's fixes back onto develop
    pub fn switch_master_to_develop(&mut self) -> Result<bool, GitError> {
        let names = self.names();
        let _group = monitor::open_group("master -> develop");

        if !self.require_clean("merge master into develop")? {
            return Ok(false);
        }
        if !self.repo.checkout(&names.develop_branch, true, true)?.success {
            return Ok(false);
        }
        if !self.repo.branch_exists(&names.master_branch)? {
            info!("No '{}' branch yet, nothing to merge", names.master_branch);
            return Ok(true);
        }
        self.merge_into_current(&names.master_branch, MergeFavor::Normal)
    }

    /// Discard every change in the working tree, untracked files included.
    ///
    /// Reset subscribers run whatever the outcome.
    pub fn reset_hard(&mut self) -> Result<bool, GitError> {
        let outcome = self.discard_changes();
        let branch = self.repo.current_branch().unwrap_or_default();
        let subscribers_ok = self.repo.raise_event(LifecycleEvent::Reset, &branch);
        outcome.map(|removed_all| removed_all && subscribers_ok)
    }

    fn discard_changes(&self) -> Result<bool, GitError> {
        let _group = monitor::open_group("reset");
        if let Some(head) = self.repo.head_commit()? {
            self.repo
                .raw()
                .reset(head.as_object(), ResetType::Hard, None)?;
        }

        let mut options = StatusOptions::new();
        options.include_untracked(true).include_ignored(false);
        let statuses = self.repo.raw().statuses(Some(&mut options))?;

        let mut removed_all = true;
        for entry in statuses.iter() {
            if !entry.status().contains(Status::WT_NEW) {
                continue;
            }
            let Some(relative) = entry.path() else {
                continue;
            };
            let path = self.repo.working_dir().join(relative);
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = removed {
                error!("Could not delete {}: {}", path.display(), e);
                removed_all = false;
            }
        }

        info!("Reset {} to HEAD", self.repo.display_path());
        Ok(removed_all)
    }

    fn require_clean(&self, action: &str) -> Result<bool, GitError> {
        if self.repo.is_clean()? {
            return Ok(true);
        }
        warn!(
            "Working tree of {} has uncommitted changes, cannot {}",
            self.repo.display_path(),
            action
        );
        Ok(false)
    }

    fn ensure_committed(&self, auto_commit: bool, names: &WorkflowConfig) -> Result<bool, GitError> {
        if !auto_commit {
            return self.require_clean("switch branch");
        }
        match self
            .repo
            .commit(&names.auto_commit_message, CommitBehavior::CreateNew)?
        {
            CommitResult::Error => Ok(false),
            _ => Ok(true),
        }
    }

    fn merge_into_current(&self, source: &str, favor: MergeFavor) -> Result<bool, GitError> {
        match self.repo.merge_branch(source, favor) {
            Ok(outcome) => Ok(outcome.is_success()),
            Err(GitError::NotFound(what)) => {
                warn!("Nothing to merge: {} does not exist", what);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Fold the merge result into the tip when it is still unpushed
    fn collapse_tip(&self) -> Result<bool, GitError> {
        if !self.repo.can_amend()? {
            return Ok(true);
        }
        match self.repo.amend_commit(None, None, true) {
            Ok(CommitResult::Error) => Ok(false),
            Ok(_) => Ok(true),
            Err(GitError::Git(e)) if e.code() == ErrorCode::Unmerged => {
                warn!("Cannot amend with unmerged entries: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
