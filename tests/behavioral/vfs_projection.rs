// ABOUTME: Behavioral tests for the head/, branches/ and remotes/ projection
// Verifies routing, the current-branch redirect, snapshot staleness and write protection

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

use gitvfs::commands::{InMemoryCommandRegistry, REPOSITORY_COMMANDS};
use gitvfs::credentials::MemorySecretStore;
use gitvfs::git::RepositorySettings;
use gitvfs::vfs::{ProtoState, VirtualFileSystem};

use super::fixtures::{BareRemote, TestRepo, FOLDER};

fn names(infos: Vec<gitvfs::vfs::FileInfo>) -> Vec<String> {
    infos.into_iter().map(|info| info.name).collect()
}

fn empty_vfs(root: &std::path::Path) -> VirtualFileSystem {
    VirtualFileSystem::new(
        root,
        RepositorySettings::default(),
        Arc::new(MemorySecretStore::new()),
    )
}

#[test]
fn test_repository_root_lists_three_zones() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let mut vfs = test_repo.vfs()?;

    // Act
    let contents = vfs.get_directory_contents(FOLDER)?;

    // Assert
    assert_eq!(names(contents.clone()), vec!["branches", "head", "remotes"]);
    let head = contents.iter().find(|info| info.name == "head");
    assert_eq!(
        head.and_then(|info| info.physical_path.clone()),
        Some(test_repo.path().to_path_buf())
    );
    Ok(())
}

#[test]
fn test_current_branch_and_head_are_the_same_file() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let mut vfs = test_repo.vfs()?;

    // Act
    let through_head = vfs.get_file_info("world/app/head/README.md")?;
    let through_branch = vfs.get_file_info("world/app/branches/develop/README.md")?;

    // Assert
    let through_head = through_head.expect("README through head");
    let through_branch = through_branch.expect("README through branches/develop");
    assert_eq!(through_head.physical_path, through_branch.physical_path);
    assert_eq!(
        through_head.physical_path,
        Some(test_repo.path().join("README.md"))
    );
    assert!(through_branch.is_writable());
    assert_eq!(
        vfs.read_text("world/app/branches/develop/README.md")?,
        "# Test Repo\n"
    );
    Ok(())
}

#[test]
fn test_branch_listing_is_stale_until_invalidated() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let mut vfs = test_repo.vfs()?;
    assert_eq!(names(vfs.get_directory_contents("world/app/branches")?), vec!["develop"]);

    // Act: a branch appears behind the file system's back
    test_repo.branch("feature")?;
    let before = names(vfs.get_directory_contents("world/app/branches")?);
    assert!(vfs.invalidate(FOLDER));
    let after = names(vfs.get_directory_contents("world/app/branches")?);

    // Assert
    assert_eq!(before, vec!["develop"]);
    assert_eq!(after, vec!["develop", "feature"]);
    assert!(!vfs.invalidate("world/unknown"));
    Ok(())
}

#[test]
fn test_snapshot_zone_is_read_only_but_copyable() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    test_repo.branch("feature")?;
    test_repo.add_commit("README.md", "changed on develop\n", "Change readme")?;
    let mut vfs = test_repo.vfs()?;

    // Act
    let write_to_snapshot = vfs.write_text("x", "world/app/branches/feature/new.txt");
    let copied = vfs.copy_to(
        "world/app/branches/feature/README.md",
        "world/app/head/docs/old-readme.md",
    );

    // Assert
    assert!(!write_to_snapshot);
    assert!(!test_repo.path().join("new.txt").exists());
    assert!(copied);
    assert_eq!(test_repo.read("docs/old-readme.md")?, "# Test Repo\n");

    let info = vfs
        .get_file_info("world/app/branches/feature/README.md")?
        .expect("snapshot entry");
    assert!(!info.is_writable());
    assert_eq!(info.size, "# Test Repo\n".len() as u64);
    Ok(())
}

#[test]
fn test_repository_and_container_folders_refuse_writes() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let mut vfs = test_repo.vfs()?;

    // Act / Assert
    assert!(!vfs.write_text("x", FOLDER));
    assert!(!vfs.delete("world/app/head"));
    assert!(!vfs.delete("world"));
    assert!(!vfs.ensure_directory("world/app/branches/develop-copy"));
    assert!(test_repo.path().join("README.md").exists());

    // Next to the repository the plain file system is writable
    assert!(vfs.write_text("notes", "world/notes.txt"));
    assert_eq!(vfs.read_text("world/notes.txt")?, "notes");
    Ok(())
}

#[test]
fn test_physical_path_marks_writable_nodes() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let mut vfs = test_repo.vfs()?;

    // Act
    let root = vfs.get_file_info(FOLDER)?.expect("repository root");
    let head = vfs.get_file_info("world/app/head")?.expect("head");
    let current = vfs
        .get_file_info("world/app/branches/develop")?
        .expect("current branch");

    // Assert: the repository root is virtual, the working directory is not
    assert!(root.physical_path.is_none());
    assert!(!root.is_writable());
    assert_eq!(head.physical_path, Some(test_repo.path().to_path_buf()));
    assert_eq!(current.physical_path, head.physical_path);
    assert!(vfs.ensure_directory("world/app/head"));
    assert!(vfs.ensure_directory("world/app/branches/develop/docs"));
    assert!(test_repo.path().join("docs").is_dir());

    // The working directory itself is never replaced or removed
    assert!(!vfs.write_text("x", "world/app/head"));
    assert!(!vfs.delete("world/app/branches/develop"));
    assert!(test_repo.path().join(".git").exists());
    Ok(())
}

#[test]
fn test_remote_branches_are_listed_per_remote() -> Result<()> {
    // Arrange
    let remote = BareRemote::new()?;
    let test_repo = TestRepo::new()?;
    test_repo.add_remote(&remote)?;
    test_repo.remote_ref("develop", test_repo.head_id()?)?;
    let mut vfs = test_repo.vfs()?;

    // Act
    let remotes = names(vfs.get_directory_contents("world/app/remotes")?);
    let branches = names(vfs.get_directory_contents("world/app/remotes/origin")?);
    let content = vfs.read_text("world/app/remotes/origin/develop/README.md")?;

    // Assert
    assert_eq!(remotes, vec!["origin"]);
    assert_eq!(branches, vec!["develop"]);
    assert_eq!(content, "# Test Repo\n");
    assert!(vfs.get_file_info("world/app/remotes/upstream")?.is_none());
    Ok(())
}

#[test]
fn test_zero_commit_remote_gets_one_initial_commit() -> Result<()> {
    // Arrange
    let remote = BareRemote::new()?;
    let root = TempDir::new()?;

    // Act: open twice through independent file systems
    for _ in 0..2 {
        let mut vfs = empty_vfs(root.path());
        vfs.declare(FOLDER, &remote.url(), true)?;
        let (opened, has_errors) = vfs.load_all();
        assert!(!has_errors);
        assert_eq!(opened, vec![FOLDER.to_string()]);
    }

    // Assert
    let mut vfs = empty_vfs(root.path());
    vfs.declare(FOLDER, &remote.url(), true)?;
    vfs.load_all();
    let repo = vfs.repository(FOLDER).expect("repository is open");
    assert_eq!(repo.get_commit_count()?, 1);
    let head = repo.head_commit()?.expect("initial commit");
    assert_eq!(head.message(), Some("Initial commit"));
    Ok(())
}

#[test]
fn test_registry_entries_follow_repository_lifetime() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let registry = InMemoryCommandRegistry::new();
    let mut vfs = empty_vfs(test_repo.root()).with_registry(registry.clone());
    vfs.declare(FOLDER, "file:///unused", true)?;

    // Act
    vfs.load_all();
    let registered = registry.commands_for(FOLDER);
    let opened_as = vfs.declared()[0].opened_as().map(str::to_string);
    let back_reference = vfs
        .repository_for(&vfs.declared()[0])
        .map(|repo| repo.display_path().to_string());
    let closed = vfs.close(FOLDER);

    // Assert
    assert_eq!(registered, REPOSITORY_COMMANDS.to_vec());
    assert_eq!(opened_as.as_deref(), Some(FOLDER));
    assert_eq!(back_reference.as_deref(), Some(FOLDER));
    assert!(vfs.repository_for(&vfs.declared()[0]).is_none());
    assert!(closed);
    assert!(registry.commands_for(FOLDER).is_empty());
    assert_eq!(vfs.declared()[0].state(), &ProtoState::Closed);

    // A closed repository is not reopened by the next load
    let (opened, has_errors) = vfs.load_all();
    assert!(opened.is_empty());
    assert!(!has_errors);
    assert!(vfs.repository(FOLDER).is_none());
    Ok(())
}

#[test]
fn test_status_reports_each_open_repository() -> Result<()> {
    // Arrange
    let test_repo = TestRepo::new()?;
    let vfs = test_repo.vfs()?;
    std::fs::write(test_repo.path().join("scratch.txt"), "wip")?;

    // Act
    let statuses = vfs.status();

    // Assert
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].display_name, FOLDER);
    assert_eq!(statuses[0].current_branch, "develop");
    assert!(statuses[0].is_dirty);
    assert_eq!(statuses[0].commits_ahead_of_origin, None);
    Ok(())
}
