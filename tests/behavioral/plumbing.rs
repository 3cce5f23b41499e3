// ABOUTME: Behavioral tests for checkout, commit, amend, merge, pull and push
// Remotes are local bare repositories so no network is involved

use anyhow::Result;
use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::{Arc, Mutex};

use gitvfs::events::LifecycleEvent;
use gitvfs::git::{
    CommitBehavior, CommitResult, EnsuredBranch, GitError, MergeFavor, MergeOutcome, PushOutcome,
};
use gitvfs::plugins::PluginManager;

use super::fixtures::{clone_of, commit_in, BareRemote, TestRepo};

/// Records every branch plugins were bound to and fails for one of them
struct RecordingPlugins {
    failing_branch: &'static str,
    bound: Arc<Mutex<Vec<String>>>,
}

impl PluginManager for RecordingPlugins {
    fn ensure_plugins(&mut self, branch: &str) -> bool {
        if let Ok(mut bound) = self.bound.lock() {
            bound.push(branch.to_string());
        }
        branch != self.failing_branch
    }

    fn is_initialized(&self, _branch: &str) -> bool {
        true
    }

    fn count(&self) -> usize {
        1
    }
}

#[test]
fn test_checkout_of_current_branch_needs_no_reload() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let mut repo = test_repo.open()?;

    // Act: no remote is configured, so any fetch would be a no-op anyway
    let outcome = repo.checkout("develop", false, false)?;

    // Assert
    assert!(outcome.success);
    assert!(!outcome.reload_needed);
    Ok(())
}

#[test]
fn test_checkout_switches_branch_and_working_tree() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.branch("feature")?;
    test_repo.commit_on_branch("feature", "feature.txt", "feature work\n", "Feature work")?;
    let mut repo = test_repo.open()?;

    // Act
    let outcome = repo.checkout("feature", true, true)?;

    // Assert
    assert!(outcome.success);
    assert!(outcome.reload_needed);
    assert_eq!(repo.current_branch()?, "feature");
    assert_eq!(test_repo.read("feature.txt")?, "feature work\n");
    Ok(())
}

#[test]
fn test_dirty_tree_blocks_checkout() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.branch("feature")?;
    let mut repo = test_repo.open()?;
    fs::write(test_repo.path().join("wip.txt"), "wip")?;

    // Act
    let outcome = repo.checkout("feature", true, true)?;

    // Assert
    assert!(!outcome.success);
    assert!(!outcome.reload_needed);
    assert_eq!(repo.current_branch()?, "develop");
    Ok(())
}

#[test]
fn test_failing_new_branch_hook_rolls_checkout_back() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.branch("feature")?;
    let mut repo = test_repo.open()?;
    repo.events_mut()
        .subscribe(LifecycleEvent::NewCurrentBranch, "veto", |context| {
            context.branch != "feature"
        });

    // Act
    let outcome = repo.checkout("feature", true, true)?;

    // Assert
    assert!(!outcome.success);
    assert_eq!(repo.current_branch()?, "develop");
    Ok(())
}

#[test]
fn test_failing_plugins_roll_checkout_back_and_rebind_previous() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.branch("feature")?;
    let mut repo = test_repo.open()?;
    let bound = Arc::new(Mutex::new(Vec::new()));
    repo.set_plugin_manager(Box::new(RecordingPlugins {
        failing_branch: "feature",
        bound: bound.clone(),
    }));

    // Act
    let outcome = repo.checkout("feature", true, true)?;

    // Assert
    assert!(!outcome.success);
    assert_eq!(repo.current_branch()?, "develop");
    let bound = bound.lock().map(|b| b.clone()).unwrap_or_default();
    assert_eq!(bound, vec!["feature".to_string(), "develop".to_string()]);
    Ok(())
}

#[test]
fn test_commit_on_clean_tree_reports_no_changes() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let repo = test_repo.open()?;
    let before = test_repo.head_id()?;

    // Act
    let result = repo.commit("Nothing here", CommitBehavior::CreateNew)?;

    // Assert
    assert_eq!(result, CommitResult::NoChanges);
    assert_eq!(test_repo.head_id()?, before);
    Ok(())
}

#[test]
fn test_commit_stages_additions_and_deletions() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let repo = test_repo.open()?;
    fs::remove_file(test_repo.path().join("README.md"))?;
    fs::create_dir_all(test_repo.path().join("src"))?;
    fs::write(test_repo.path().join("src/main.rs"), "fn main() {}\n")?;

    // Act
    let result = repo.commit("Replace readme", CommitBehavior::CreateNew)?;

    // Assert
    assert_eq!(result, CommitResult::Committed);
    assert!(repo.is_clean()?);
    let head = repo.head_commit()?.expect("new commit");
    let tree = head.tree()?;
    assert!(tree.get_path(std::path::Path::new("src/main.rs")).is_ok());
    assert!(tree.get_name("README.md").is_none());
    assert_eq!(test_repo.commit_count()?, 2);
    Ok(())
}

#[test]
fn test_amend_behaviors_combine_messages() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.add_commit("a.txt", "a\n", "Work in progress")?;
    let repo = test_repo.open()?;
    fs::write(test_repo.path().join("a.txt"), "a2\n")?;

    // Act
    let result = repo.commit("more", CommitBehavior::AmendIfPossibleAppendMessage)?;

    // Assert
    assert_eq!(result, CommitResult::Amended);
    assert_eq!(test_repo.commit_count()?, 2);
    let head = repo.head_commit()?.expect("amended commit");
    assert_eq!(head.message(), Some("Work in progress\nmore"));
    assert_eq!(test_repo.read("a.txt")?, "a2\n");
    Ok(())
}

#[test]
fn test_empty_message_from_editor_cancels_amend() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.add_commit("a.txt", "a\n", "Add a")?;
    let repo = test_repo.open()?;
    let before = test_repo.head_id()?;
    let erase = |_: &str| String::new();

    // Act
    let result = repo.amend_commit(Some(&erase), None, true)?;

    // Assert
    assert_eq!(result, CommitResult::Error);
    assert_eq!(test_repo.head_id()?, before);
    Ok(())
}

#[test]
fn test_missing_date_from_editor_cancels_amend() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.add_commit("a.txt", "a\n", "Add a")?;
    let repo = test_repo.open()?;
    let drop_date = |_: DateTime<Utc>| -> Option<DateTime<Utc>> { None };

    // Act
    let result = repo.amend_commit(None, Some(&drop_date), true)?;

    // Assert
    assert_eq!(result, CommitResult::Error);
    Ok(())
}

#[test]
fn test_amend_rewrites_author_date() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.add_commit("a.txt", "a\n", "Add a")?;
    let repo = test_repo.open()?;
    let new_date = DateTime::parse_from_rfc3339("2020-05-01T12:00:00Z")?.with_timezone(&Utc);
    let set_date = move |_: DateTime<Utc>| Some(new_date);

    // Act
    let result = repo.amend_commit(None, Some(&set_date), true)?;

    // Assert
    assert_eq!(result, CommitResult::Amended);
    let head = repo.head_commit()?.expect("amended commit");
    assert_eq!(head.author().when().seconds(), new_date.timestamp());
    assert_eq!(head.message(), Some("Add a"));
    Ok(())
}

#[test]
fn test_amend_back_to_parent_tree_drops_the_tip() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let initial = test_repo.head_id()?;
    test_repo.add_commit("a.txt", "a\n", "Add a")?;
    let repo = test_repo.open()?;
    fs::remove_file(test_repo.path().join("a.txt"))?;

    // Act
    let result = repo.amend_commit(None, None, true)?;

    // Assert
    assert_eq!(result, CommitResult::NoChanges);
    assert_eq!(test_repo.head_id()?, initial);
    assert_eq!(test_repo.commit_count()?, 1);
    assert!(repo.is_clean()?);
    Ok(())
}

#[test]
fn test_merge_conflict_is_refused_unless_a_side_is_favored() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.branch("other")?;
    test_repo.commit_on_branch("other", "README.md", "other\n", "Other readme")?;
    test_repo.add_commit("README.md", "develop\n", "Develop readme")?;
    let repo = test_repo.open()?;
    let before = test_repo.head_id()?;

    // Act
    let refused = repo.merge_branch("other", MergeFavor::Normal)?;

    // Assert: nothing moved
    assert_eq!(refused, MergeOutcome::Conflict);
    assert_eq!(test_repo.head_id()?, before);
    assert!(repo.is_clean()?);
    assert_eq!(test_repo.read("README.md")?, "develop\n");

    // Act
    let merged = repo.merge_branch("other", MergeFavor::Theirs)?;

    // Assert
    assert_eq!(merged, MergeOutcome::Merged);
    assert_eq!(test_repo.read("README.md")?, "other\n");
    let head = repo.head_commit()?.expect("merge commit");
    assert_eq!(head.parent_count(), 2);
    assert_eq!(head.message(), Some("Merge other into develop"));
    Ok(())
}

#[test]
fn test_merge_of_missing_branch_is_not_found() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let repo = test_repo.open()?;

    // Act
    let result = repo.merge_branch("nope", MergeFavor::Normal);

    // Assert
    assert!(matches!(result, Err(GitError::NotFound(_))));
    Ok(())
}

#[test]
fn test_ensure_branch_tracks_origin_branch() -> Result<()> {
    // Arrange
    let remote = BareRemote::new()?;
    let test_repo = TestRepo::new()?;
    test_repo.add_remote(&remote)?;
    test_repo.remote_ref("feature", test_repo.head_id()?)?;
    let repo = test_repo.open()?;

    // Act
    let created = repo.ensure_branch("feature")?;
    let again = repo.ensure_branch("feature")?;
    let fresh = repo.ensure_branch("scratch")?;

    // Assert
    assert_eq!(created, EnsuredBranch::Tracking);
    assert_eq!(again, EnsuredBranch::Existing);
    assert_eq!(fresh, EnsuredBranch::CreatedAtHead);
    let upstream = repo.upstream_target("feature")?;
    assert_eq!(
        upstream.map(|(name, _)| name),
        Some("origin/feature".to_string())
    );
    assert!(repo.upstream_target("scratch")?.is_none());
    Ok(())
}

#[test]
fn test_push_creates_upstream_then_is_up_to_date() -> Result<()> {
    // Arrange
    let remote = BareRemote::new()?;
    let test_repo = TestRepo::new()?;
    test_repo.add_remote(&remote)?;
    let repo = test_repo.open()?;

    // Act
    let first = repo.push("develop")?;
    let second = repo.push("develop")?;

    // Assert
    assert_eq!(first, PushOutcome::Pushed);
    assert_eq!(second, PushOutcome::UpToDate);
    assert_eq!(remote.branch_tip("develop")?, Some(test_repo.head_id()?));
    assert_eq!(repo.commits_ahead("develop")?, Some(0));
    Ok(())
}

#[test]
fn test_pushed_tip_cannot_be_amended() -> Result<()> {
    // Arrange
    let remote = BareRemote::new()?;
    let test_repo = TestRepo::new()?;
    test_repo.add_remote(&remote)?;
    let repo = test_repo.open()?;
    repo.push("develop")?;
    let before = test_repo.head_id()?;

    // Act
    let amend = repo.amend_commit(None, None, false);
    let keep_message = repo.commit("Follow-up", CommitBehavior::AmendIfPossibleKeepMessage)?;

    // Assert
    assert!(!repo.can_amend()?);
    assert!(matches!(amend, Err(GitError::InvalidState(_))));
    // Falls back to a new commit, which has nothing to record
    assert_eq!(keep_message, CommitResult::NoChanges);
    assert_eq!(test_repo.head_id()?, before);
    Ok(())
}

#[test]
fn test_pull_fast_forwards_to_remote_work() -> Result<()> {
    // Arrange
    let remote = BareRemote::new()?;
    let test_repo = TestRepo::new()?;
    test_repo.add_remote(&remote)?;
    let repo = test_repo.open()?;
    repo.push("develop")?;

    let (_other_dir, other) = clone_of(&remote, "develop")?;
    let remote_tip = commit_in(&other, "remote.txt", "from elsewhere\n", "Remote work")?;
    other
        .find_remote("origin")?
        .push(&["refs/heads/develop:refs/heads/develop"], None)?;

    // Act
    let outcome = repo.pull(MergeFavor::Normal)?;

    // Assert
    assert_eq!(outcome, MergeOutcome::FastForward);
    assert_eq!(test_repo.head_id()?, remote_tip);
    assert_eq!(test_repo.read("remote.txt")?, "from elsewhere\n");
    assert!(repo.is_clean()?);
    Ok(())
}

#[test]
fn test_pull_refuses_dirty_working_tree() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let repo = test_repo.open()?;
    fs::write(test_repo.path().join("wip.txt"), "wip")?;

    // Act
    let result = repo.pull(MergeFavor::Normal);

    // Assert
    assert!(matches!(result, Err(GitError::DirtyWorkingTree(_))));
    Ok(())
}

#[test]
fn test_merge_upstream_without_any_remote_branch_is_nothing_to_merge() -> Result<()> {
    // Arrange
    let remote = BareRemote::new()?;
    let test_repo = TestRepo::new()?;
    test_repo.add_remote(&remote)?;
    let repo = test_repo.open()?;

    // Act
    let outcome = repo.merge_upstream("develop", MergeFavor::Normal)?;

    // Assert
    assert_eq!(outcome, MergeOutcome::NothingToMerge);
    assert!(outcome.is_success());
    Ok(())
}

#[test]
fn test_push_over_diverged_remote_is_rejected() -> Result<()> {
    // Arrange: someone else pushed to develop after us
    let remote = BareRemote::new()?;
    let test_repo = TestRepo::new()?;
    test_repo.add_remote(&remote)?;
    let repo = test_repo.open()?;
    repo.push("develop")?;

    let (_other_dir, other) = clone_of(&remote, "develop")?;
    let theirs = commit_in(&other, "theirs.txt", "theirs\n", "Their change")?;
    other
        .find_remote("origin")?
        .push(&["refs/heads/develop:refs/heads/develop"], None)?;
    test_repo.add_commit("ours.txt", "ours\n", "Our change")?;

    // Act
    let result = repo.push("develop");

    // Assert: the remote keeps their commit
    assert!(matches!(
        result,
        Err(GitError::PushRejected { ref reference, .. }) if reference.contains("develop")
    ));
    assert_eq!(remote.branch_tip("develop")?, Some(theirs));
    Ok(())
}

#[test]
fn test_fetch_from_missing_remote_fails() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let missing = test_repo.root().join("no-such-remote");
    test_repo
        .repo()?
        .remote("origin", &missing.display().to_string())?;
    let repo = test_repo.open()?;

    // Act
    let result = repo.fetch_branches(true);

    // Assert
    assert!(matches!(
        result,
        Err(GitError::FetchFailed { ref remote, .. }) if remote == "origin"
    ));
    Ok(())
}

#[test]
fn test_amend_that_would_empty_a_merge_commit_is_refused() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.branch("other")?;
    test_repo.commit_on_branch("other", "other.txt", "other\n", "Add other")?;
    test_repo.add_commit("a.txt", "a\n", "Add a")?;
    let repo = test_repo.open()?;
    assert_eq!(repo.merge_branch("other", MergeFavor::Normal)?, MergeOutcome::Merged);
    let merge = test_repo.head_id()?;
    fs::remove_file(test_repo.path().join("other.txt"))?;

    // Act
    let result = repo.amend_commit(None, None, true);

    // Assert
    assert!(matches!(result, Err(GitError::InvalidState(_))));
    assert_eq!(test_repo.head_id()?, merge);
    Ok(())
}
