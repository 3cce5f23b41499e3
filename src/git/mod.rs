// ABOUTME: libgit2-backed repository handle, plumbing, snapshots and diffs

pub mod diff_engine;
pub mod plumbing;
pub mod remote;
pub mod repository;
pub mod snapshot;

pub use diff_engine::{DiffEngine, DiffRoot};
pub use plumbing::{
    CheckoutOutcome, CommitBehavior, CommitResult, EnsuredBranch, MergeFavor, MergeOutcome,
    PushOutcome,
};
pub use repository::{GitError, OpenRepository, RepositorySettings};
pub use snapshot::{BranchSnapshotCache, BranchSnapshots, EntryKind, SnapshotEntry, TreeSnapshot};
