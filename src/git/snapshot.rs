// ABOUTME: Immutable per-commit tree snapshots and the lazily populated branch snapshot cache
// The cache is filled once and only refreshed after an explicit invalidate()

use chrono::{DateTime, Utc};
use git2::{BranchType, ErrorCode, ObjectType, Oid, Repository, TreeEntry};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::repository::GitError;

/// Read-only view of one commit's file tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub branch: String,
    pub remote: Option<String>,
    pub commit_id: Oid,
    pub tree_id: Oid,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Blob { id: Oid, size: u64, executable: bool },
    Tree { id: Oid },
}

/// One blob or subtree inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub name: String,
    /// Path relative to the snapshot root
    pub path: String,
    pub kind: EntryKind,
}

impl SnapshotEntry {
    pub fn is_blob(&self) -> bool {
        matches!(self.kind, EntryKind::Blob { .. })
    }

    pub fn size(&self) -> u64 {
        match self.kind {
            EntryKind::Blob { size, .. } => size,
            EntryKind::Tree { .. } => 0,
        }
    }
}

impl TreeSnapshot {
    pub fn capture(
        repo: &Repository,
        branch: &str,
        remote: Option<&str>,
        commit_id: Oid,
    ) -> Result<Self, GitError> {
        let commit = repo.find_commit(commit_id)?;
        Ok(Self {
            branch: branch.to_string(),
            remote: remote.map(str::to_string),
            commit_id,
            tree_id: commit.tree_id(),
            time: commit_time(&commit.time()),
        })
    }

    /// Entry at `path`; the empty path is the root tree
    pub fn entry(&self, repo: &Repository, path: &str) -> Result<Option<SnapshotEntry>, GitError> {
        if path.is_empty() {
            return Ok(Some(SnapshotEntry {
                name: String::new(),
                path: String::new(),
                kind: EntryKind::Tree { id: self.tree_id },
            }));
        }

        let tree = repo.find_tree(self.tree_id)?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parent = path.rsplit_once('/').map_or("", |(parent, _)| parent);
        to_snapshot_entry(repo, parent, &entry)
    }

    /// Children of the subtree at `path`
    pub fn list(&self, repo: &Repository, path: &str) -> Result<Vec<SnapshotEntry>, GitError> {
        let tree_id = match self.entry(repo, path)? {
            Some(SnapshotEntry {
                kind: EntryKind::Tree { id },
                ..
            }) => id,
            Some(_) => {
                return Err(GitError::InvalidState(format!(
                    "'{}' is a file, not a directory",
                    path
                )))
            }
            None => return Err(GitError::NotFound(path.to_string())),
        };

        let tree = repo.find_tree(tree_id)?;
        let mut entries = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            if let Some(entry) = to_snapshot_entry(repo, path, &entry)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Content of the blob at `path`
    pub fn read(&self, repo: &Repository, path: &str) -> Result<Vec<u8>, GitError> {
        match self.entry(repo, path)? {
            Some(SnapshotEntry {
                kind: EntryKind::Blob { id, .. },
                ..
            }) => Ok(repo.find_blob(id)?.content().to_vec()),
            Some(_) => Err(GitError::InvalidState(format!(
                "'{}' is a directory, not a file",
                path
            ))),
            None => Err(GitError::NotFound(path.to_string())),
        }
    }
}

fn to_snapshot_entry(
    repo: &Repository,
    parent: &str,
    entry: &TreeEntry<'_>,
) -> Result<Option<SnapshotEntry>, GitError> {
    let name = String::from_utf8_lossy(entry.name_bytes()).into_owned();
    let path = if parent.is_empty() {
        name.clone()
    } else {
        format!("{}/{}", parent, name)
    };

    let kind = match entry.kind() {
        Some(ObjectType::Tree) => EntryKind::Tree { id: entry.id() },
        Some(ObjectType::Blob) => {
            let (size, _) = repo.odb()?.read_header(entry.id())?;
            EntryKind::Blob {
                id: entry.id(),
                size: size as u64,
                executable: entry.filemode() == 0o100_755,
            }
        }
        // Submodule links and anything else have no content here
        _ => return Ok(None),
    };

    Ok(Some(SnapshotEntry { name, path, kind }))
}

pub(crate) fn commit_time(time: &git2::Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.seconds(), 0).unwrap_or_default()
}

/// Snapshots of local branches, and of remote branches keyed by remote name
#[derive(Debug, Clone, Default)]
pub struct BranchSnapshots {
    pub local: BTreeMap<String, Arc<TreeSnapshot>>,
    pub remotes: BTreeMap<String, BTreeMap<String, Arc<TreeSnapshot>>>,
}

impl BranchSnapshots {
    pub fn remote(&self, remote: &str) -> Option<&BTreeMap<String, Arc<TreeSnapshot>>> {
        self.remotes.get(remote)
    }
}

/// Populated on first use, never refreshed implicitly
#[derive(Debug, Default)]
pub struct BranchSnapshotCache {
    current: Option<BranchSnapshots>,
    retired: Option<BranchSnapshots>,
}

impl BranchSnapshotCache {
    pub fn is_populated(&self) -> bool {
        self.current.is_some()
    }

    pub fn get_or_refresh(&mut self, repo: &Repository) -> Result<&BranchSnapshots, GitError> {
        let snapshots = match self.current.take() {
            Some(snapshots) => snapshots,
            None => {
                let fresh = Self::collect(repo, self.retired.as_ref())?;
                self.retired = None;
                fresh
            }
        };
        Ok(self.current.insert(snapshots))
    }

    /// Forget the populated snapshots. The next access enumerates branches again,
    /// reusing snapshots whose branch tip did not move.
    pub fn invalidate(&mut self) {
        if let Some(current) = self.current.take() {
            self.retired = Some(current);
        }
    }

    fn collect(
        repo: &Repository,
        previous: Option<&BranchSnapshots>,
    ) -> Result<BranchSnapshots, GitError> {
        let mut snapshots = BranchSnapshots::default();

        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            let (Some(name), Some(tip)) = (branch.name()?, branch.get().target()) else {
                continue;
            };
            let reused = previous.and_then(|p| p.local.get(name));
            let snapshot = reuse_or_capture(repo, reused, name, None, tip)?;
            snapshots.local.insert(name.to_string(), snapshot);
        }

        let remote_names = repo.remotes()?;
        for branch in repo.branches(Some(BranchType::Remote))? {
            let (branch, _) = branch?;
            let Some(full_name) = branch.name()? else {
                continue;
            };
            // Symbolic refs like origin/HEAD have no direct target
            let Some(tip) = branch.get().target() else {
                continue;
            };
            let Some((remote, name)) = remote_names
                .iter()
                .flatten()
                .filter_map(|remote| {
                    full_name
                        .strip_prefix(remote)
                        .and_then(|rest| rest.strip_prefix('/'))
                        .map(|name| (remote, name))
                })
                .max_by_key(|(remote, _)| remote.len())
            else {
                continue;
            };
            if name == "HEAD" {
                continue;
            }

            let reused = previous
                .and_then(|p| p.remotes.get(remote))
                .and_then(|branches| branches.get(name));
            let snapshot = reuse_or_capture(repo, reused, name, Some(remote), tip)?;
            snapshots
                .remotes
                .entry(remote.to_string())
                .or_default()
                .insert(name.to_string(), snapshot);
        }

        debug!(
            "Captured {} local and {} remote branch snapshots",
            snapshots.local.len(),
            snapshots.remotes.values().map(BTreeMap::len).sum::<usize>()
        );
        Ok(snapshots)
    }
}

fn reuse_or_capture(
    repo: &Repository,
    previous: Option<&Arc<TreeSnapshot>>,
    branch: &str,
    remote: Option<&str>,
    tip: Oid,
) -> Result<Arc<TreeSnapshot>, GitError> {
    match previous {
        Some(snapshot) if snapshot.commit_id == tip => Ok(Arc::clone(snapshot)),
        _ => Ok(Arc::new(TreeSnapshot::capture(repo, branch, remote, tip)?)),
    }
}
