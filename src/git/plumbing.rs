// ABOUTME: Version-control plumbing over one open repository
// ensure-branch, fetch, pull-merge, checkout, commit/amend and push

use chrono::{DateTime, Utc};
use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Commit, Error, ErrorClass, ErrorCode, FileFavor, IndexAddOption, MergeOptions, Oid,
    PushOptions, ResetType, Signature, Time,
};
use tracing::{debug, error, info, warn};

use super::remote::{fetch_options, remote_callbacks};
use super::repository::{GitError, OpenRepository};
use super::snapshot::commit_time;
use crate::monitor;

/// Tie-break for a three-way merge when both sides touch the same region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeFavor {
    #[default]
    Normal,
    /// Keep the checked-out branch's side
    Ours,
    /// Keep the incoming branch's side
    Theirs,
}

impl MergeFavor {
    fn file_favor(self) -> FileFavor {
        match self {
            MergeFavor::Normal => FileFavor::Normal,
            MergeFavor::Ours => FileFavor::Ours,
            MergeFavor::Theirs => FileFavor::Theirs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    UpToDate,
    FastForward,
    Merged,
    /// No upstream to merge from
    NothingToMerge,
    /// Conflicting changes; the working tree was left untouched
    Conflict,
}

impl MergeOutcome {
    pub fn is_success(self) -> bool {
        self != MergeOutcome::Conflict
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub success: bool,
    /// The working tree changed and views of it must be reloaded
    pub reload_needed: bool,
}

impl CheckoutOutcome {
    fn failed(reload_needed: bool) -> Self {
        Self {
            success: false,
            reload_needed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitBehavior {
    CreateNew,
    AmendIfPossibleKeepMessage,
    AmendIfPossibleAppendMessage,
    AmendIfPossiblePrependMessage,
    AmendIfPossibleOverwriteMessage,
}

impl CommitBehavior {
    pub fn is_amend(self) -> bool {
        self != CommitBehavior::CreateNew
    }

    /// Message of the resulting commit given the previous one
    pub fn combine(self, previous: &str, message: &str) -> String {
        let previous = previous.trim_end();
        match self {
            CommitBehavior::CreateNew | CommitBehavior::AmendIfPossibleOverwriteMessage => {
                message.to_string()
            }
            CommitBehavior::AmendIfPossibleKeepMessage => previous.to_string(),
            CommitBehavior::AmendIfPossibleAppendMessage => format!("{}\n{}", previous, message),
            CommitBehavior::AmendIfPossiblePrependMessage => format!("{}\n{}", message, previous),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitResult {
    /// Cancelled by a message or date transformer
    Error,
    NoChanges,
    Committed,
    Amended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    UpToDate,
    Pushed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsuredBranch {
    Existing,
    /// Created from the remote branch and tracking it
    Tracking,
    /// Invented at the current tip
    CreatedAtHead,
    /// Nothing to point at yet; the branch is born by its first commit
    Unborn,
}

pub type MessageEditor<'a> = &'a dyn Fn(&str) -> String;
pub type DateEditor<'a> = &'a dyn Fn(DateTime<Utc>) -> Option<DateTime<Utc>>;

impl OpenRepository {
    fn origin(&self) -> &str {
        &self.settings.workflow.origin_remote
    }

    /// Make sure a local branch called `name` exists
    pub fn ensure_branch(&self, name: &str) -> Result<EnsuredBranch, GitError> {
        if name.is_empty() {
            return Err(GitError::InvalidArgument(
                "branch name cannot be empty".to_string(),
            ));
        }
        if self.branch_exists(name)? {
            return Ok(EnsuredBranch::Existing);
        }

        let remote_name = format!("{}/{}", self.origin(), name);
        match self.repo.find_branch(&remote_name, BranchType::Remote) {
            Ok(remote_branch) => {
                let commit = remote_branch.get().peel_to_commit()?;
                let mut local = self.repo.branch(name, &commit, false)?;
                local.set_upstream(Some(&remote_name))?;
                info!("Created branch '{}' tracking '{}'", name, remote_name);
                return Ok(EnsuredBranch::Tracking);
            }
            Err(e) if e.code() == ErrorCode::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        match self.head_commit()? {
            Some(head) => {
                warn!(
                    "Branch '{}' exists neither locally nor on '{}'; creating it at {}",
                    name,
                    self.origin(),
                    head.id()
                );
                self.repo.branch(name, &head, false)?;
                Ok(EnsuredBranch::CreatedAtHead)
            }
            None => {
                warn!("Branch '{}' cannot be created before the first commit", name);
                Ok(EnsuredBranch::Unborn)
            }
        }
    }

    /// Update remote-tracking refs. Never merges.
    pub fn fetch_branches(&self, origin_only: bool) -> Result<(), GitError> {
        let _group = monitor::open_group("fetch");

        let remotes: Vec<String> = if origin_only {
            vec![self.origin().to_string()]
        } else {
            self.repo
                .remotes()?
                .iter()
                .flatten()
                .map(str::to_string)
                .collect()
        };

        for name in remotes {
            let mut remote = match self.repo.find_remote(&name) {
                Ok(remote) => remote,
                Err(e) if e.code() == ErrorCode::NotFound => {
                    info!("No remote '{}' to fetch from", name);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut options = fetch_options(&self.credentials);
            if let Err(e) = remote.fetch(&[] as &[&str], Some(&mut options), None) {
                monitor::fatal(format!(
                    "Fetch from '{}' failed, fix the remote manually: {}",
                    name, e
                ));
                return Err(GitError::FetchFailed {
                    remote: name,
                    message: e.message().to_string(),
                });
            }
            debug!("Fetched {}", name);
        }
        Ok(())
    }

    /// Fetch, then merge the current branch's upstream into it
    pub fn pull(&self, favor: MergeFavor) -> Result<MergeOutcome, GitError> {
        self.fetch_branches(true)?;

        if !self.is_clean()? {
            warn!("Working tree of {} is dirty, not pulling", self.display_path());
            return Err(GitError::DirtyWorkingTree("pull".to_string()));
        }

        let branch = self.current_branch()?;
        self.ensure_branch(&branch)?;
        self.merge_upstream(&branch, favor)
    }

    /// Merge the upstream of `branch` (the checked-out branch) into HEAD
    pub fn merge_upstream(&self, branch: &str, favor: MergeFavor) -> Result<MergeOutcome, GitError> {
        let upstream = match self.upstream_target(branch)? {
            Some(upstream) => Some(upstream),
            None => self.track_origin_branch(branch)?,
        };

        match upstream {
            Some((name, target)) => self.merge_commit_into_head(target, &name, favor),
            None if !self.origin_has_branches()? => {
                info!(
                    "'{}' is the only branch and '{}' has no commits yet, nothing to merge",
                    branch,
                    self.origin()
                );
                Ok(MergeOutcome::NothingToMerge)
            }
            None => {
                warn!("Branch '{}' has no upstream, nothing to merge", branch);
                Ok(MergeOutcome::NothingToMerge)
            }
        }
    }

    /// Bind `branch` to `origin/<branch>` when that remote branch exists
    fn track_origin_branch(&self, branch: &str) -> Result<Option<(String, Oid)>, GitError> {
        let remote_name = format!("{}/{}", self.origin(), branch);
        let target = match self.repo.find_branch(&remote_name, BranchType::Remote) {
            Ok(remote_branch) => remote_branch.get().target(),
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if let Ok(mut local) = self.repo.find_branch(branch, BranchType::Local) {
            local.set_upstream(Some(&remote_name))?;
            info!("Branch '{}' now tracks '{}'", branch, remote_name);
        }
        Ok(target.map(|target| (remote_name, target)))
    }

    fn origin_has_branches(&self) -> Result<bool, GitError> {
        let pattern = format!("refs/remotes/{}/*", self.origin());
        for reference in self.repo.references_glob(&pattern)? {
            if reference?.name().is_some_and(|name| !name.ends_with("/HEAD")) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Merge a local branch's tip into HEAD
    pub fn merge_branch(&self, source: &str, favor: MergeFavor) -> Result<MergeOutcome, GitError> {
        let tip = self
            .branch_tip(source)?
            .ok_or_else(|| GitError::NotFound(format!("branch '{}'", source)))?;
        self.merge_commit_into_head(tip, source, favor)
    }

    /// Merge `source` into the checked-out branch, refusing on conflict
    pub fn merge_commit_into_head(
        &self,
        source: Oid,
        label: &str,
        favor: MergeFavor,
    ) -> Result<MergeOutcome, GitError> {
        let _group = monitor::open_group("merge");
        let annotated = self.repo.find_annotated_commit(source)?;
        let (analysis, _preference) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            debug!("Already up to date with {}", label);
            return Ok(MergeOutcome::UpToDate);
        }

        let branch = self.current_branch()?;
        if analysis.is_unborn() || analysis.is_fast_forward() {
            let target = self.repo.find_commit(source)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.safe();
            self.repo.checkout_tree(target.as_object(), Some(&mut checkout))?;

            let refname = format!("refs/heads/{}", branch);
            let reflog = format!("fast-forward to {}", label);
            match self.repo.find_reference(&refname) {
                Ok(mut reference) => {
                    reference.set_target(source, &reflog)?;
                }
                Err(e) if e.code() == ErrorCode::NotFound => {
                    self.repo.reference(&refname, source, true, &reflog)?;
                }
                Err(e) => return Err(e.into()),
            }
            self.repo.set_head(&refname)?;
            info!("Fast-forwarded '{}' to {}", branch, label);
            return Ok(MergeOutcome::FastForward);
        }

        let mut merge_options = MergeOptions::new();
        merge_options
            .file_favor(favor.file_favor())
            .fail_on_conflict(true);

        // Dry run on an in-memory index so a conflict never touches the working tree
        let ours = self.repo.head()?.peel_to_commit()?;
        let theirs = self.repo.find_commit(source)?;
        let mut preview_options = MergeOptions::new();
        preview_options.file_favor(favor.file_favor());
        let preview = self
            .repo
            .merge_commits(&ours, &theirs, Some(&preview_options))?;
        if preview.has_conflicts() {
            warn!("Merging {} into '{}' conflicts, fix it manually", label, branch);
            return Ok(MergeOutcome::Conflict);
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.safe();

        match self
            .repo
            .merge(&[&annotated], Some(&mut merge_options), Some(&mut checkout))
        {
            Ok(()) => {}
            Err(e) if is_conflict(&e) => {
                self.repo.cleanup_state()?;
                warn!(
                    "Merging {} into '{}' conflicts, fix it manually: {}",
                    label, branch, e
                );
                return Ok(MergeOutcome::Conflict);
            }
            Err(e) => {
                self.repo.cleanup_state()?;
                monitor::fatal(format!("Merge of {} into '{}' failed: {}", label, branch, e));
                return Err(e.into());
            }
        }

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            self.repo.reset(ours.as_object(), ResetType::Hard, None)?;
            self.repo.cleanup_state()?;
            warn!("Merging {} into '{}' conflicts, fix it manually", label, branch);
            return Ok(MergeOutcome::Conflict);
        }

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let signature = self.signature()?;
        let message = format!("Merge {} into {}", label, branch);
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &[&ours, &theirs],
        )?;
        self.repo.cleanup_state()?;

        info!("{}", message);
        Ok(MergeOutcome::Merged)
    }

    /// Check out `branch`. A failing new-current-branch hook rolls the checkout back.
    pub fn checkout(
        &mut self,
        branch: &str,
        skip_fetch: bool,
        skip_pull_merge: bool,
    ) -> Result<CheckoutOutcome, GitError> {
        if branch.is_empty() {
            return Err(GitError::InvalidArgument(
                "branch name cannot be empty".to_string(),
            ));
        }

        let previous = self.current_branch()?;
        if previous == branch {
            return Ok(CheckoutOutcome {
                success: true,
                reload_needed: false,
            });
        }

        let _group = monitor::open_group("checkout");
        if !skip_fetch {
            self.fetch_branches(true)?;
        }
        if !self.is_clean()? {
            warn!(
                "Working tree of {} is dirty, cannot check out '{}'",
                self.display_path(),
                branch
            );
            return Ok(CheckoutOutcome::failed(false));
        }

        self.ensure_branch(branch)?;
        self.switch_head(branch)?;

        if !self.raise_new_current_branch(branch) {
            error!(
                "New-branch hook failed on '{}', returning to '{}'",
                branch, previous
            );
            self.switch_head(&previous)?;
            self.plugins.rebind(&previous);
            return Ok(CheckoutOutcome::failed(false));
        }

        if !skip_pull_merge && !self.merge_upstream(branch, MergeFavor::Normal)?.is_success() {
            return Ok(CheckoutOutcome::failed(true));
        }

        Ok(CheckoutOutcome {
            success: true,
            reload_needed: true,
        })
    }

    /// Point HEAD at `branch`, updating unmodified files of the working tree
    pub(crate) fn switch_head(&self, branch: &str) -> Result<(), GitError> {
        if let Some(tip) = self.branch_tip(branch)? {
            let commit = self.repo.find_commit(tip)?;
            let mut checkout = CheckoutBuilder::new();
            checkout.safe();
            self.repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
        }
        self.repo.set_head(&format!("refs/heads/{}", branch))?;
        info!("Checked out '{}' in {}", branch, self.display_path());
        Ok(())
    }

    /// Stage every addition, modification and deletion; returns the staged tree
    pub fn stage_all(&self) -> Result<Oid, GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(index.write_tree()?)
    }

    fn head_tree_id(&self) -> Result<Oid, GitError> {
        match self.head_commit()? {
            Some(head) => Ok(head.tree_id()),
            None => Ok(self.repo.treebuilder(None)?.write()?),
        }
    }

    /// Stage everything and commit it, amending instead when `behavior` asks and amend is legal
    pub fn commit(&self, message: &str, behavior: CommitBehavior) -> Result<CommitResult, GitError> {
        if behavior.is_amend() && self.can_amend()? {
            let edit = |previous: &str| behavior.combine(previous, message);
            return self.amend_commit(Some(&edit), None, true);
        }

        if message.trim().is_empty() {
            return Err(GitError::InvalidArgument(
                "commit message cannot be empty".to_string(),
            ));
        }

        let tree_id = self.stage_all()?;
        if tree_id == self.head_tree_id()? {
            debug!("Nothing to commit in {}", self.display_path());
            return Ok(CommitResult::NoChanges);
        }

        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature()?;
        let head = self.head_commit()?;
        let parents: Vec<&Commit> = head.iter().collect();
        let id = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;

        info!("Created commit {} in {}", id, self.display_path());
        Ok(CommitResult::Committed)
    }

    /// The tip may be rewritten: it exists and has not been pushed
    pub fn can_amend(&self) -> Result<bool, GitError> {
        if self.head_commit()?.is_none() {
            return Ok(false);
        }
        let branch = self.current_branch()?;
        match self.commits_ahead(&branch)? {
            Some(ahead) => Ok(ahead > 0),
            None => Ok(true),
        }
    }

    /// Rewrite the tip with the staged working tree.
    ///
    /// A transformer returning an empty message or no date cancels with
    /// [`CommitResult::Error`]. When the amended tree equals the parent's, the
    /// tip is dropped and the remaining changes (if any) are committed afresh.
    pub fn amend_commit(
        &self,
        edit_message: Option<MessageEditor<'_>>,
        edit_date: Option<DateEditor<'_>>,
        skip_if_nothing_to_commit: bool,
    ) -> Result<CommitResult, GitError> {
        if !self.can_amend()? {
            warn!("Amend in {} is not allowed: tip was already pushed", self.display_path());
            return Err(GitError::InvalidState(
                "cannot amend a commit that is not ahead of its upstream".to_string(),
            ));
        }
        let head = self
            .head_commit()?
            .ok_or_else(|| GitError::InvalidState("no commit to amend".to_string()))?;

        let previous_message = head.message().unwrap_or_default().to_string();
        let author = head.author();
        let previous_date = commit_time(&author.when());

        let message = match edit_message {
            Some(edit) => edit(&previous_message),
            None => previous_message.clone(),
        };
        if message.trim().is_empty() {
            warn!("Amend cancelled: empty message");
            return Ok(CommitResult::Error);
        }
        let date = match edit_date {
            Some(edit) => match edit(previous_date) {
                Some(date) => date,
                None => {
                    warn!("Amend cancelled: no date");
                    return Ok(CommitResult::Error);
                }
            },
            None => previous_date,
        };

        let tree_id = self.stage_all()?;
        if skip_if_nothing_to_commit
            && tree_id == head.tree_id()
            && message.trim_end() == previous_message.trim_end()
            && date == previous_date
        {
            return Ok(CommitResult::NoChanges);
        }

        let when = Time::new(date.timestamp(), author.when().offset_minutes());
        let author = Signature::new(
            author.name().unwrap_or(&self.settings.signature.name),
            author.email().unwrap_or(&self.settings.signature.email),
            &when,
        )?;
        let committer = self.signature()?;

        if head.parent_count() > 0 && head.parent(0)?.tree_id() == tree_id {
            if head.parent_count() != 1 {
                return Err(GitError::InvalidState(format!(
                    "amending merge commit {} would leave it empty",
                    head.id()
                )));
            }
            return self.collapse_onto_parent(&head, &author, &committer, &message);
        }

        let tree = self.repo.find_tree(tree_id)?;
        let id = head.amend(
            Some("HEAD"),
            Some(&author),
            Some(&committer),
            None,
            Some(&message),
            Some(&tree),
        )?;
        info!("Amended {} as {}", head.id(), id);
        Ok(CommitResult::Amended)
    }

    /// The amended tip would be empty: drop it and commit whatever remains on top of its parent
    fn collapse_onto_parent(
        &self,
        head: &Commit<'_>,
        author: &Signature<'_>,
        committer: &Signature<'_>,
        message: &str,
    ) -> Result<CommitResult, GitError> {
        let parent = head.parent(0)?;
        self.repo.reset(parent.as_object(), ResetType::Hard, None)?;
        debug!("Dropped empty commit {}", head.id());

        let tree_id = self.stage_all()?;
        if tree_id == parent.tree_id() {
            return Ok(CommitResult::NoChanges);
        }
        let tree = self.repo.find_tree(tree_id)?;
        self.repo
            .commit(Some("HEAD"), author, committer, message, &tree, &[&parent])?;
        Ok(CommitResult::Amended)
    }

    /// Push `branch` to origin, creating its upstream when missing
    pub fn push(&self, branch: &str) -> Result<PushOutcome, GitError> {
        let tip = self
            .branch_tip(branch)?
            .ok_or_else(|| GitError::NotFound(format!("branch '{}'", branch)))?;
        let origin = self.origin().to_string();

        let upstream = self.upstream_target(branch)?;
        match &upstream {
            Some((name, target)) if *target == tip => {
                info!("'{}' is up to date with {}", branch, name);
                return Ok(PushOutcome::UpToDate);
            }
            Some(_) => {}
            None => warn!("'{}' has no upstream; creating it on '{}'", branch, origin),
        }

        let _group = monitor::open_group("push");
        let mut remote = self.repo.find_remote(&origin).map_err(|e| {
            GitError::NotFound(format!("remote '{}': {}", origin, e.message()))
        })?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);

        let mut rejection: Option<(String, String)> = None;
        let pushed = {
            let mut callbacks = remote_callbacks(&self.credentials);
            callbacks.push_update_reference(|reference, status| {
                if let Some(message) = status {
                    rejection = Some((reference.to_string(), message.to_string()));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut options))
        };

        match pushed {
            Ok(()) => {}
            Err(e) if e.code() == ErrorCode::NotFastForward => {
                error!("Push of '{}' rejected, fix it manually: {}", branch, e);
                return Err(GitError::PushRejected {
                    reference: branch.to_string(),
                    message: e.message().to_string(),
                });
            }
            Err(e) => {
                monitor::fatal(format!("Push of '{}' failed: {}", branch, e));
                return Err(e.into());
            }
        }
        if let Some((reference, message)) = rejection {
            error!("Remote rejected {}: {}", reference, message);
            return Err(GitError::PushRejected { reference, message });
        }

        self.repo.reference(
            &format!("refs/remotes/{}/{}", origin, branch),
            tip,
            true,
            "push",
        )?;
        if upstream.is_none() {
            let mut config = self.repo.config()?;
            config.set_str(&format!("branch.{}.remote", branch), &origin)?;
            config.set_str(
                &format!("branch.{}.merge", branch),
                &format!("refs/heads/{}", branch),
            )?;
        }

        info!("Pushed '{}' to '{}'", branch, origin);
        Ok(PushOutcome::Pushed)
    }

    /// Create local branch `name` at `target`
    pub fn create_branch_at(&self, name: &str, target: Oid) -> Result<(), GitError> {
        let commit = self.repo.find_commit(target)?;
        self.repo.branch(name, &commit, false)?;
        info!("Created branch '{}' at {}", name, target);
        Ok(())
    }
}

/// libgit2 reports a refused merge as a generic error of the merge class
fn is_conflict(error: &Error) -> bool {
    matches!(error.code(), ErrorCode::MergeConflict | ErrorCode::Conflict)
        || error.class() == ErrorClass::Merge
}
