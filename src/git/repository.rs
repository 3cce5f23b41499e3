// ABOUTME: Open repository handle: working directory, display path, status and lifecycle wiring
// Plumbing operations live in plumbing.rs; this file owns construction, queries and disposal

use git2::{BranchType, Commit, ErrorCode, Oid, Repository, Signature, Status, StatusOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::commands::{CommandRegistry, REPOSITORY_COMMANDS};
use crate::config::{AppConfig, DiffConfig, SignatureConfig, WorkflowConfig};
use crate::credentials::{CredentialCallback, RepositoryKey};
use crate::events::{EventContext, LifecycleEvent, LifecycleEvents};
use crate::git::diff_engine::DiffEngine;
use crate::git::snapshot::{BranchSnapshotCache, BranchSnapshots};
use crate::models::SimpleStatus;
use crate::plugins::{PluginBinding, PluginManager};

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository error: {0}")]
    Git(#[from] git2::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid repository state: {0}")]
    InvalidState(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Working tree has uncommitted changes, cannot {0}")]
    DirtyWorkingTree(String),
    #[error("Fetch from '{remote}' failed: {message}")]
    FetchFailed { remote: String, message: String },
    #[error("Push of '{reference}' rejected: {message}")]
    PushRejected { reference: String, message: String },
}

/// Per-repository settings taken from the application config
#[derive(Debug, Clone, Default)]
pub struct RepositorySettings {
    pub workflow: WorkflowConfig,
    pub signature: SignatureConfig,
    pub diff: DiffConfig,
}

impl From<&AppConfig> for RepositorySettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            workflow: config.workflow.clone(),
            signature: config.signature.clone(),
            diff: config.diff.clone(),
        }
    }
}

/// A repository backed by an open libgit2 handle.
///
/// Not safe for concurrent structural operations; callers serialize access
/// (one owner per working directory).
pub struct OpenRepository {
    pub(crate) repo: Repository,
    working_dir: PathBuf,
    display_path: String,
    key: RepositoryKey,
    pub(crate) credentials: CredentialCallback,
    pub(crate) settings: RepositorySettings,
    pub(crate) snapshots: BranchSnapshotCache,
    pub(crate) plugins: PluginBinding,
    pub(crate) events: LifecycleEvents,
    registry: Option<Arc<dyn CommandRegistry>>,
}

impl OpenRepository {
    /// Wrap an already-open handle. `working_dir` must end with `display_path`.
    pub fn new(
        repo: Repository,
        working_dir: PathBuf,
        display_path: &str,
        key: RepositoryKey,
        credentials: CredentialCallback,
        settings: RepositorySettings,
    ) -> Result<Self, GitError> {
        if display_path.is_empty() {
            return Err(GitError::InvalidArgument(
                "display path cannot be empty".to_string(),
            ));
        }
        if !working_dir.ends_with(display_path) {
            return Err(GitError::InvalidArgument(format!(
                "working directory {} does not end with display path {}",
                working_dir.display(),
                display_path
            )));
        }

        Ok(Self {
            repo,
            working_dir,
            display_path: display_path.to_string(),
            key,
            credentials,
            settings,
            snapshots: BranchSnapshotCache::default(),
            plugins: PluginBinding::default(),
            events: LifecycleEvents::default(),
            registry: None,
        })
    }

    /// Open the repository at `working_dir` without cloning
    pub fn open(
        working_dir: &Path,
        display_path: &str,
        key: RepositoryKey,
        credentials: CredentialCallback,
        settings: RepositorySettings,
    ) -> Result<Self, GitError> {
        let repo = Repository::open(working_dir)
            .map_err(|e| GitError::NotFound(format!("{}: {}", working_dir.display(), e)))?;
        Self::new(
            repo,
            working_dir.to_path_buf(),
            display_path,
            key,
            credentials,
            settings,
        )
    }

    pub fn set_plugin_manager(&mut self, manager: Box<dyn PluginManager>) {
        self.plugins = PluginBinding::new(manager);
    }

    /// Expose this repository's commands through `registry` until disposal
    pub fn attach_registry(&mut self, registry: Arc<dyn CommandRegistry>) {
        registry.register(&self.display_path, REPOSITORY_COMMANDS);
        self.registry = Some(registry);
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn display_path(&self) -> &str {
        &self.display_path
    }

    pub fn key(&self) -> &RepositoryKey {
        &self.key
    }

    pub fn settings(&self) -> &RepositorySettings {
        &self.settings
    }

    /// Raw libgit2 handle
    pub fn raw(&self) -> &Repository {
        &self.repo
    }

    pub fn events_mut(&mut self) -> &mut LifecycleEvents {
        &mut self.events
    }

    pub fn plugins_mut(&mut self) -> &mut PluginBinding {
        &mut self.plugins
    }

    pub fn diff_engine(&self) -> DiffEngine<'_> {
        DiffEngine::new(&self.repo, &self.settings.diff)
    }

    /// Current branch, read live from the handle. Detached HEAD reads as "HEAD".
    pub fn current_branch(&self) -> Result<String, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = self.repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .unwrap_or("HEAD")
                    .to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commit at HEAD, `None` for a repository without commits
    pub fn head_commit(&self) -> Result<Option<Commit<'_>>, GitError> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head.peel_to_commit()?)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn branch_exists(&self, name: &str) -> Result<bool, GitError> {
        Ok(self.branch_tip(name)?.is_some())
    }

    /// Tip of a local branch
    pub fn branch_tip(&self, name: &str) -> Result<Option<Oid>, GitError> {
        match self.repo.find_branch(name, BranchType::Local) {
            Ok(branch) => Ok(branch.get().target()),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Upstream branch name and tip, `None` when untracked or the remote ref is missing
    pub fn upstream_target(&self, branch: &str) -> Result<Option<(String, Oid)>, GitError> {
        let local = match self.repo.find_branch(branch, BranchType::Local) {
            Ok(local) => local,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match local.upstream() {
            Ok(upstream) => {
                let name = upstream.name()?.unwrap_or_default().to_string();
                Ok(upstream.get().target().map(|target| (name, target)))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Commits on `branch` not yet on its upstream, `None` when untracked
    pub fn commits_ahead(&self, branch: &str) -> Result<Option<usize>, GitError> {
        let Some(tip) = self.branch_tip(branch)? else {
            return Ok(None);
        };
        match self.upstream_target(branch)? {
            Some((_, upstream)) => {
                let (ahead, _behind) = self.repo.graph_ahead_behind(tip, upstream)?;
                Ok(Some(ahead))
            }
            None => Ok(None),
        }
    }

    pub fn is_clean(&self) -> Result<bool, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true);
        opts.include_ignored(false);

        let statuses = self.repo.statuses(Some(&mut opts))?;
        Ok(statuses
            .iter()
            .all(|entry| entry.status() == Status::CURRENT || entry.status().is_ignored()))
    }

    pub fn get_commit_count(&self) -> Result<usize, GitError> {
        if self.head_commit()?.is_none() {
            return Ok(0);
        }
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        Ok(revwalk.count())
    }

    /// Repository identity if configured, otherwise the configured fallback
    pub fn signature(&self) -> Result<Signature<'static>, GitError> {
        match self.repo.signature() {
            Ok(signature) => Ok(signature),
            Err(_) => Ok(Signature::now(
                &self.settings.signature.name,
                &self.settings.signature.email,
            )?),
        }
    }

    pub fn status(&self) -> Result<SimpleStatus, GitError> {
        let current_branch = self.current_branch()?;
        let status = SimpleStatus {
            display_name: self.display_path.clone(),
            commits_ahead_of_origin: self.commits_ahead(&current_branch)?,
            is_dirty: !self.is_clean()?,
            plugin_count: self.plugins.count_for(&current_branch),
            current_branch,
        };
        debug!("Repository status: {}", status.summary());
        Ok(status)
    }

    /// Snapshots of every local and remote branch, enumerated on first use
    pub fn branch_snapshots(&mut self) -> Result<&BranchSnapshots, GitError> {
        self.snapshots.get_or_refresh(&self.repo)
    }

    /// Drop cached snapshots; the next access enumerates branches again
    pub fn invalidate_snapshots(&mut self) {
        self.snapshots.invalidate();
    }

    /// Run every subscriber of `event`; false if any failed
    pub fn raise_event(&self, event: LifecycleEvent, branch: &str) -> bool {
        let context = EventContext {
            event,
            branch,
            working_dir: &self.working_dir,
        };
        self.events.raise(&context)
    }

    /// Plugin re-binding plus new-current-branch subscribers
    pub fn raise_new_current_branch(&mut self, branch: &str) -> bool {
        let plugins_ok = self.plugins.rebind(branch);
        let events_ok = self.raise_event(LifecycleEvent::NewCurrentBranch, branch);
        plugins_ok && events_ok
    }

    /// Dispatch one of the commands exposed through the registry
    pub fn invoke_command(&mut self, name: &str, args: &[String]) -> Result<bool, GitError> {
        match name {
            "reset" => self.workflow().reset_hard(),
            "fetch" => self.fetch_branches(true).map(|()| true),
            "status" => {
                let status = self.status()?;
                info!("{}", status.summary());
                Ok(true)
            }
            "run" => {
                let (program, rest) = args.split_first().ok_or_else(|| {
                    GitError::InvalidArgument("run needs a program to execute".to_string())
                })?;
                let status = std::process::Command::new(program)
                    .args(rest)
                    .current_dir(&self.working_dir)
                    .status()?;
                if !status.success() {
                    tracing::warn!("'{}' exited with {}", program, status);
                }
                Ok(status.success())
            }
            other => Err(GitError::InvalidArgument(format!(
                "unknown repository command '{}'",
                other
            ))),
        }
    }

    /// Release the handle and unregister from the command registry
    pub fn dispose(self) {
        info!("Disposing repository {}", self.display_path);
    }
}

impl Drop for OpenRepository {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.unregister(&self.display_path);
        }
    }
}
