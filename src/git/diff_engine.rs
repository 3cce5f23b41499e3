// ABOUTME: Commit-range and date-range diffs bucketed by declared roots
// Collects the commit messages of the range, leaving out the configured bot committer

use chrono::{DateTime, Utc};
use git2::{Commit, DiffFindOptions, DiffOptions, ErrorCode, Oid, Repository, Sort};
use tracing::debug;

use super::repository::GitError;
use crate::config::DiffConfig;
use crate::models::{FileChange, GitDiffResult};

/// A named group of path prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRoot {
    pub name: String,
    pub prefixes: Vec<String>,
}

impl DiffRoot {
    pub fn new<I, S>(name: impl Into<String>, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

pub struct DiffEngine<'r> {
    repo: &'r Repository,
    config: &'r DiffConfig,
}

impl<'r> DiffEngine<'r> {
    pub fn new(repo: &'r Repository, config: &'r DiffConfig) -> Self {
        Self { repo, config }
    }

    /// Diff between two revisions (ids, branches or tags).
    ///
    /// Messages cover the commits after `from` up to and including `to`, oldest first.
    pub fn diff_commits(
        &self,
        from: &str,
        to: &str,
        roots: &[DiffRoot],
        with_messages: bool,
    ) -> Result<GitDiffResult, GitError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.diff_between(Some(&from), &to, roots, with_messages)
    }

    /// Diff over HEAD's history between two points in time
    pub fn diff_dates(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        roots: &[DiffRoot],
        with_messages: bool,
    ) -> Result<GitDiffResult, GitError> {
        if to <= from {
            return Err(GitError::Validation(format!(
                "date range end {} must be after its start {}",
                to, from
            )));
        }

        let head = match self.repo.head() {
            Ok(head) => head.peel_to_commit()?,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(empty_result(roots));
            }
            Err(e) => return Err(e.into()),
        };

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(head.id())?;
        revwalk.set_sorting(Sort::TIME)?;

        let mut to_boundary: Option<Oid> = None;
        let mut from_boundary: Option<Oid> = None;
        for oid in revwalk {
            let oid = oid?;
            let seconds = self.repo.find_commit(oid)?.time().seconds();
            if to_boundary.is_none() && seconds <= to.timestamp() {
                to_boundary = Some(oid);
            }
            if seconds <= from.timestamp() {
                from_boundary = Some(oid);
                break;
            }
        }

        let Some(to_boundary) = to_boundary else {
            debug!("No commit at or before {}", to);
            return Ok(empty_result(roots));
        };
        let to_commit = self.repo.find_commit(to_boundary)?;
        let from_commit = from_boundary
            .map(|oid| self.repo.find_commit(oid))
            .transpose()?;
        self.diff_between(from_commit.as_ref(), &to_commit, roots, with_messages)
    }

    fn resolve(&self, revision: &str) -> Result<Commit<'r>, GitError> {
        let object = self
            .repo
            .revparse_single(revision)
            .map_err(|e| GitError::NotFound(format!("revision '{}': {}", revision, e.message())))?;
        Ok(object.peel_to_commit()?)
    }

    /// `from == None` diffs against the empty tree
    fn diff_between(
        &self,
        from: Option<&Commit<'_>>,
        to: &Commit<'_>,
        roots: &[DiffRoot],
        with_messages: bool,
    ) -> Result<GitDiffResult, GitError> {
        let mut result = empty_result(roots);
        if from.map(Commit::id) == Some(to.id()) {
            return Ok(result);
        }

        let old_tree = from.map(Commit::tree).transpose()?;
        let new_tree = to.tree()?;
        let mut options = DiffOptions::new();
        let mut diff =
            self.repo
                .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut options))?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

        for delta in diff.deltas() {
            let Some(path) = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .and_then(|p| p.to_str())
            else {
                continue;
            };

            // Others is always last
            let bucket = roots
                .iter()
                .position(|root| root.contains(path))
                .unwrap_or(roots.len());
            result.buckets[bucket].changes.push(FileChange {
                path: path.to_string(),
                kind: delta.status().into(),
            });
        }

        if with_messages {
            result.messages = self.messages(from.map(Commit::id), to.id())?;
        }
        debug!(
            "Diff {}..{}: {} buckets, {} messages",
            from.map(|c| c.id().to_string()).unwrap_or_default(),
            to.id(),
            result.buckets.len(),
            result.messages.len()
        );
        Ok(result)
    }

    fn messages(&self, from: Option<Oid>, to: Oid) -> Result<Vec<String>, GitError> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(to)?;
        if let Some(from) = from {
            revwalk.hide(from)?;
        }
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

        let mut messages = Vec::new();
        for oid in revwalk {
            let commit = self.repo.find_commit(oid?)?;
            if self.is_bot(&commit) {
                continue;
            }
            messages.push(commit.message().unwrap_or_default().trim_end().to_string());
        }
        Ok(messages)
    }

    fn is_bot(&self, commit: &Commit<'_>) -> bool {
        let committer = commit.committer();
        let name_matches = matches!(
            (&self.config.bot_committer_name, committer.name()),
            (Some(bot), Some(name)) if bot == name
        );
        let email_matches = matches!(
            (&self.config.bot_committer_email, committer.email()),
            (Some(bot), Some(email)) if bot == email
        );
        name_matches || email_matches
    }
}

fn empty_result(roots: &[DiffRoot]) -> GitDiffResult {
    GitDiffResult::empty(roots.iter().map(|root| root.name.as_str()))
}
