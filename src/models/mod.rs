// ABOUTME: Data transfer objects handed to presentation and release tooling

pub mod diff;
pub mod status;

pub use diff::{ChangeKind, DiffBucket, FileChange, GitDiffResult, OTHERS_BUCKET};
pub use status::SimpleStatus;
