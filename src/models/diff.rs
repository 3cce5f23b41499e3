// ABOUTME: Result of a commit-range diff, bucketed by declared roots

use serde::{Deserialize, Serialize};

/// Catch-all bucket for paths outside every declared root
pub const OTHERS_BUCKET: &str = "Others";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
}

impl From<git2::Delta> for ChangeKind {
    fn from(delta: git2::Delta) -> Self {
        match delta {
            git2::Delta::Added => ChangeKind::Added,
            git2::Delta::Deleted => ChangeKind::Deleted,
            git2::Delta::Renamed => ChangeKind::Renamed,
            git2::Delta::Copied => ChangeKind::Copied,
            git2::Delta::Typechange => ChangeKind::TypeChanged,
            _ => ChangeKind::Modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBucket {
    pub name: String,
    pub changes: Vec<FileChange>,
}

impl DiffBucket {
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            changes: Vec::new(),
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.path.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitDiffResult {
    /// One bucket per declared root, in declaration order, then `Others`
    pub buckets: Vec<DiffBucket>,
    /// Commit messages, oldest first
    pub messages: Vec<String>,
}

impl GitDiffResult {
    /// One empty bucket per root name plus an empty `Others` bucket
    pub fn empty<'a>(root_names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut buckets: Vec<DiffBucket> = root_names.into_iter().map(DiffBucket::empty).collect();
        buckets.push(DiffBucket::empty(OTHERS_BUCKET));
        Self {
            buckets,
            messages: Vec::new(),
        }
    }

    pub fn bucket(&self, name: &str) -> Option<&DiffBucket> {
        self.buckets.iter().find(|b| b.name == name)
    }

    pub fn others(&self) -> Option<&DiffBucket> {
        self.bucket(OTHERS_BUCKET)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.buckets.iter().all(|b| b.changes.is_empty())
    }
}
