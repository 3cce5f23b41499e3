// ABOUTME: Projection of one repository into head/, branches/ and remotes/
// head is the working directory; branches and remotes are read-only commit snapshots

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use super::node::FileInfo;
use super::VfsError;
use crate::git::{GitError, OpenRepository, SnapshotEntry, TreeSnapshot};

pub const HEAD_DIR: &str = "head";
pub const BRANCHES_DIR: &str = "branches";
pub const REMOTES_DIR: &str = "remotes";

/// What a path inside a repository resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualNode {
    Root,
    /// Working-directory passthrough; the file itself may not exist yet
    Head { physical: PathBuf },
    BranchesContainer,
    /// `remotes/` itself, or one remote's directory
    RemotesContainer { remote: Option<String> },
    BranchSnapshot { snapshot: Arc<TreeSnapshot> },
    TreeEntry {
        snapshot: Arc<TreeSnapshot>,
        entry: SnapshotEntry,
    },
}

impl VirtualNode {
    pub fn physical_path(&self) -> Option<&PathBuf> {
        match self {
            VirtualNode::Head { physical } => Some(physical),
            _ => None,
        }
    }
}

pub struct VirtualTree<'r> {
    repo: &'r mut OpenRepository,
}

impl<'r> VirtualTree<'r> {
    pub fn new(repo: &'r mut OpenRepository) -> Self {
        Self { repo }
    }

    /// Resolve `relative` (already normalized, `/`-separated). `None` when nothing is there.
    pub fn resolve(&mut self, relative: &str) -> Result<Option<VirtualNode>, GitError> {
        let segments: Vec<&str> = relative.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Ok(Some(VirtualNode::Root)),
            [HEAD_DIR, rest @ ..] => Ok(Some(self.head(rest))),
            [BRANCHES_DIR] => Ok(Some(VirtualNode::BranchesContainer)),
            [BRANCHES_DIR, rest @ ..] => {
                let current = self.repo.current_branch()?;
                let current_segments: Vec<&str> = current.split('/').collect();
                if rest.starts_with(&current_segments) {
                    return Ok(Some(self.head(&rest[current_segments.len()..])));
                }

                let found = longest_branch(&self.repo.branch_snapshots()?.local, rest);
                self.within_snapshot(found, rest)
            }
            [REMOTES_DIR] => Ok(Some(VirtualNode::RemotesContainer { remote: None })),
            [REMOTES_DIR, remote] => {
                let exists = self.repo.branch_snapshots()?.remote(remote).is_some();
                Ok(exists.then(|| VirtualNode::RemotesContainer {
                    remote: Some(remote.to_string()),
                }))
            }
            [REMOTES_DIR, remote, rest @ ..] => {
                let found = self
                    .repo
                    .branch_snapshots()?
                    .remote(remote)
                    .and_then(|branches| longest_branch(branches, rest));
                self.within_snapshot(found, rest)
            }
            _ => Ok(None),
        }
    }

    fn head(&self, rest: &[&str]) -> VirtualNode {
        let mut physical = self.repo.working_dir().to_path_buf();
        physical.extend(rest);
        VirtualNode::Head { physical }
    }

    fn within_snapshot(
        &self,
        found: Option<(Arc<TreeSnapshot>, usize)>,
        rest: &[&str],
    ) -> Result<Option<VirtualNode>, GitError> {
        let Some((snapshot, consumed)) = found else {
            return Ok(None);
        };
        let inner = rest[consumed..].join("/");
        if inner.is_empty() {
            return Ok(Some(VirtualNode::BranchSnapshot { snapshot }));
        }
        Ok(snapshot
            .entry(self.repo.raw(), &inner)?
            .map(|entry| VirtualNode::TreeEntry { snapshot, entry }))
    }

    /// Virtual path of `relative` as seen from the file-system root
    fn full_path(&self, relative: &str) -> String {
        if relative.is_empty() {
            self.repo.display_path().to_string()
        } else {
            format!("{}/{}", self.repo.display_path(), relative)
        }
    }

    pub fn get_file_info(&mut self, relative: &str) -> Result<Option<FileInfo>, VfsError> {
        let name = relative
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| last_segment(self.repo.display_path()))
            .to_string();
        let path = self.full_path(relative);

        let info = match self.resolve(relative)? {
            None => None,
            Some(VirtualNode::Root) => Some(FileInfo::directory(name, path)),
            Some(VirtualNode::Head { physical }) => {
                if physical.exists() {
                    Some(FileInfo::from_physical(name, path, &physical)?)
                } else {
                    None
                }
            }
            Some(VirtualNode::BranchesContainer | VirtualNode::RemotesContainer { .. }) => {
                Some(FileInfo::directory(name, path))
            }
            Some(VirtualNode::BranchSnapshot { snapshot }) => {
                Some(FileInfo::directory(name, path).with_modified(snapshot.time))
            }
            Some(VirtualNode::TreeEntry { snapshot, entry }) => Some(entry_info(&snapshot, &entry, path)),
        };
        Ok(info)
    }

    pub fn get_directory_contents(&mut self, relative: &str) -> Result<Vec<FileInfo>, VfsError> {
        let base = self.full_path(relative);
        let child = |name: &str| format!("{}/{}", base, name);

        let node = self
            .resolve(relative)?
            .ok_or_else(|| VfsError::NotFound(base.clone()))?;

        let mut contents = match node {
            VirtualNode::Root => vec![
                FileInfo::directory(HEAD_DIR, child(HEAD_DIR))
                    .with_physical_path(self.repo.working_dir().to_path_buf()),
                FileInfo::directory(BRANCHES_DIR, child(BRANCHES_DIR)),
                FileInfo::directory(REMOTES_DIR, child(REMOTES_DIR)),
            ],
            VirtualNode::Head { physical } => {
                let top_level = physical == self.repo.working_dir();
                let mut contents = Vec::new();
                for entry in fs::read_dir(&physical)? {
                    let entry = entry?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if top_level && name == ".git" {
                        continue;
                    }
                    contents.push(FileInfo::from_physical(
                        name.clone(),
                        child(&name),
                        &entry.path(),
                    )?);
                }
                contents
            }
            VirtualNode::BranchesContainer => {
                let current = self.repo.current_branch()?;
                let working_dir = self.repo.working_dir().to_path_buf();
                self.repo
                    .branch_snapshots()?
                    .local
                    .values()
                    .map(|snapshot| {
                        let info = FileInfo::directory(&snapshot.branch, child(&snapshot.branch))
                            .with_modified(snapshot.time);
                        if snapshot.branch == current {
                            info.with_physical_path(working_dir.clone())
                        } else {
                            info
                        }
                    })
                    .collect()
            }
            VirtualNode::RemotesContainer { remote: None } => self
                .repo
                .branch_snapshots()?
                .remotes
                .keys()
                .map(|remote| FileInfo::directory(remote, child(remote)))
                .collect(),
            VirtualNode::RemotesContainer {
                remote: Some(remote),
            } => self
                .repo
                .branch_snapshots()?
                .remote(&remote)
                .map(|branches| {
                    branches
                        .values()
                        .map(|snapshot| {
                            FileInfo::directory(&snapshot.branch, child(&snapshot.branch))
                                .with_modified(snapshot.time)
                        })
                        .collect()
                })
                .unwrap_or_default(),
            VirtualNode::BranchSnapshot { snapshot } => {
                self.snapshot_children(&snapshot, "", &base)?
            }
            VirtualNode::TreeEntry { snapshot, entry } => {
                self.snapshot_children(&snapshot, &entry.path, &base)?
            }
        };

        contents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(contents)
    }

    fn snapshot_children(
        &self,
        snapshot: &TreeSnapshot,
        inner: &str,
        base: &str,
    ) -> Result<Vec<FileInfo>, VfsError> {
        Ok(snapshot
            .list(self.repo.raw(), inner)?
            .iter()
            .map(|entry| entry_info(snapshot, entry, format!("{}/{}", base, entry.name)))
            .collect())
    }

    /// Content of a working-directory file or a snapshot blob
    pub fn read_bytes(&mut self, relative: &str) -> Result<Vec<u8>, VfsError> {
        match self.resolve(relative)? {
            Some(VirtualNode::Head { physical }) => Ok(fs::read(physical)?),
            Some(VirtualNode::TreeEntry { snapshot, entry }) => {
                Ok(snapshot.read(self.repo.raw(), &entry.path)?)
            }
            Some(_) => Err(GitError::InvalidState(format!(
                "'{}' is a directory, not a file",
                self.full_path(relative)
            ))
            .into()),
            None => Err(VfsError::NotFound(self.full_path(relative))),
        }
    }

    /// Re-enumerate branches on next access
    pub fn invalidate(&mut self) {
        self.repo.invalidate_snapshots();
    }
}

/// Longest branch name made of a prefix of `segments`, and how many segments it used
fn longest_branch(
    branches: &BTreeMap<String, Arc<TreeSnapshot>>,
    segments: &[&str],
) -> Option<(Arc<TreeSnapshot>, usize)> {
    (1..=segments.len()).rev().find_map(|count| {
        branches
            .get(&segments[..count].join("/"))
            .map(|snapshot| (snapshot.clone(), count))
    })
}

fn entry_info(snapshot: &TreeSnapshot, entry: &SnapshotEntry, path: String) -> FileInfo {
    let info = if entry.is_blob() {
        FileInfo::file(&entry.name, path, entry.size())
    } else {
        FileInfo::directory(&entry.name, path)
    };
    info.with_modified(snapshot.time)
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
