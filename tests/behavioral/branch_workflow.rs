// ABOUTME: Behavioral tests for the local/develop/master promotion workflow
// Each test starts on develop with two commits so the scratch branch has history to amend

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gitvfs::events::LifecycleEvent;

use super::fixtures::TestRepo;

fn repo_with_history() -> Result<TestRepo> {
    let test_repo = TestRepo::new()?;
    test_repo.add_commit("a.txt", "a\n", "Add a")?;
    Ok(test_repo)
}

#[test]
fn test_entering_local_twice_is_idempotent() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    let mut repo = test_repo.open()?;
    let entered = Arc::new(AtomicUsize::new(0));
    let counter = entered.clone();
    repo.events_mut()
        .subscribe(LifecycleEvent::LocalBranchEntered, "counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

    // Act
    let first = repo.workflow().switch_develop_to_local(false)?;
    let head_after_first = test_repo.head_id()?;
    let second = repo.workflow().switch_develop_to_local(false)?;

    // Assert
    assert!(first);
    assert!(second);
    assert_eq!(repo.current_branch()?, "local");
    assert_eq!(test_repo.head_id()?, head_after_first);
    assert_eq!(test_repo.commit_count()?, 2);
    // Already on local: no second entered event
    assert_eq!(entered.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn test_local_work_reaches_develop_then_master() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    let mut repo = test_repo.open()?;
    assert!(repo.workflow().switch_develop_to_local(false)?);
    fs::write(test_repo.path().join("feature.txt"), "feature\n")?;

    // Act: local -> develop folds the pending work into local's tip first
    let promoted = repo.workflow().switch_local_to_develop()?;

    // Assert
    assert!(promoted);
    assert_eq!(repo.current_branch()?, "develop");
    assert_eq!(test_repo.read("feature.txt")?, "feature\n");
    assert!(repo.is_clean()?);

    // Act: develop -> master creates master on first use
    let released = repo.workflow().switch_develop_to_master()?;

    // Assert
    assert!(released);
    assert_eq!(repo.current_branch()?, "master");
    assert_eq!(repo.branch_tip("master")?, repo.branch_tip("develop")?);
    assert_eq!(test_repo.read("feature.txt")?, "feature\n");
    Ok(())
}

#[test]
fn test_develop_to_master_fast_forwards_existing_master() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    test_repo.branch("master")?;
    let develop_tip = test_repo.add_commit("b.txt", "b\n", "Add b")?;
    let mut repo = test_repo.open()?;

    // Act
    let released = repo.workflow().switch_develop_to_master()?;

    // Assert
    assert!(released);
    assert_eq!(repo.current_branch()?, "master");
    assert_eq!(repo.branch_tip("master")?, Some(develop_tip));
    assert_eq!(test_repo.read("b.txt")?, "b\n");
    Ok(())
}

#[test]
fn test_master_fix_comes_back_to_develop() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    let mut repo = test_repo.open()?;
    assert!(repo.workflow().switch_develop_to_master()?);
    let fix = test_repo.add_commit("fix.txt", "fix\n", "Hotfix")?;

    // Act
    let merged = repo.workflow().switch_master_to_develop()?;

    // Assert
    assert!(merged);
    assert_eq!(repo.current_branch()?, "develop");
    assert_eq!(repo.branch_tip("develop")?, Some(fix));
    assert_eq!(test_repo.read("fix.txt")?, "fix\n");
    Ok(())
}

#[test]
fn test_conflicting_master_fix_is_not_merged() -> Result<()> {
    // Arrange: master and develop both edit a.txt
    let test_repo = repo_with_history()?;
    test_repo.branch("master")?;
    test_repo.commit_on_branch("master", "a.txt", "hotfix\n", "Hotfix a")?;
    let develop_tip = test_repo.add_commit("a.txt", "develop\n", "Rework a")?;
    let mut repo = test_repo.open()?;

    // Act
    let merged = repo.workflow().switch_master_to_develop()?;

    // Assert: refused, develop untouched
    assert!(!merged);
    assert_eq!(repo.current_branch()?, "develop");
    assert_eq!(test_repo.head_id()?, develop_tip);
    assert_eq!(test_repo.read("a.txt")?, "develop\n");
    assert!(repo.is_clean()?);
    Ok(())
}

#[test]
fn test_master_to_develop_without_master_only_checks_out() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    let mut repo = test_repo.open()?;
    let before = test_repo.head_id()?;

    // Act
    let merged = repo.workflow().switch_master_to_develop()?;

    // Assert
    assert!(merged);
    assert_eq!(repo.current_branch()?, "develop");
    assert_eq!(test_repo.head_id()?, before);
    Ok(())
}

#[test]
fn test_leaving_veto_keeps_local_checked_out() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    let mut repo = test_repo.open()?;
    assert!(repo.workflow().switch_develop_to_local(false)?);
    repo.events_mut()
        .subscribe(LifecycleEvent::LocalBranchLeaving, "veto", |_| false);
    fs::write(test_repo.path().join("wip.txt"), "wip\n")?;

    // Act
    let promoted = repo.workflow().switch_local_to_develop()?;

    // Assert
    assert!(!promoted);
    assert_eq!(repo.current_branch()?, "local");
    // Pending work is left untouched
    assert_eq!(test_repo.read("wip.txt")?, "wip\n");
    assert!(!repo.is_clean()?);
    Ok(())
}

#[test]
fn test_release_requires_clean_tree() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    let mut repo = test_repo.open()?;
    fs::write(test_repo.path().join("wip.txt"), "wip\n")?;

    // Act
    let released = repo.workflow().switch_develop_to_master()?;

    // Assert
    assert!(!released);
    assert_eq!(repo.current_branch()?, "develop");
    assert!(!repo.branch_exists("master")?);
    Ok(())
}

#[test]
fn test_reset_discards_work_and_notifies_subscribers() -> Result<()> {
    // Arrange
    let test_repo = repo_with_history()?;
    let mut repo = test_repo.open()?;
    let resets = Arc::new(AtomicUsize::new(0));
    let counter = resets.clone();
    repo.events_mut()
        .subscribe(LifecycleEvent::Reset, "counter", move |context| {
            assert_eq!(context.branch, "develop");
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });
    fs::write(test_repo.path().join("a.txt"), "edited\n")?;
    fs::write(test_repo.path().join("untracked.txt"), "new\n")?;

    // Act
    let reset = repo.workflow().reset_hard()?;

    // Assert
    assert!(reset);
    assert_eq!(test_repo.read("a.txt")?, "a\n");
    assert!(!test_repo.path().join("untracked.txt").exists());
    assert_eq!(resets.load(Ordering::SeqCst), 1);
    Ok(())
}
