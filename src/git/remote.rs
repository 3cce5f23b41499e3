// ABOUTME: Remote plumbing shared by fetch, pull, push and clone
// One place turns the credential callback into libgit2 callbacks

use git2::build::RepoBuilder;
use git2::{Cred, CredentialType, ErrorCode, FetchOptions, RemoteCallbacks, Repository, Signature};
use std::path::Path;
use tracing::{info, warn};

use super::repository::GitError;
use crate::config::SignatureConfig;
use crate::credentials::CredentialCallback;
use crate::monitor;

/// libgit2 keeps asking while credentials are rejected; stop after this many tries
const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// Callbacks carrying the repository's credential resolution
pub fn remote_callbacks(credentials: &CredentialCallback) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;

    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("credentials rejected by remote"));
        }

        match credentials(url, username_from_url, allowed.into()) {
            Some(creds) if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) => {
                Cred::userpass_plaintext(&creds.username, &creds.secret)
            }
            Some(creds) if allowed.contains(CredentialType::SSH_KEY) => {
                Cred::ssh_key_from_agent(&creds.username)
            }
            _ if allowed.contains(CredentialType::SSH_KEY) => {
                Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
            }
            _ if allowed.contains(CredentialType::DEFAULT) => Cred::default(),
            _ => Err(git2::Error::from_str("no credentials available for remote")),
        }
    });

    callbacks
}

pub fn fetch_options(credentials: &CredentialCallback) -> FetchOptions<'_> {
    let mut options = FetchOptions::new();
    options.remote_callbacks(remote_callbacks(credentials));
    options
}

/// Clone `url` into `path`
pub fn clone_repository(
    url: &str,
    path: &Path,
    credentials: &CredentialCallback,
) -> Result<Repository, GitError> {
    let _group = monitor::open_group("clone");
    info!("Cloning {} to {}", url, path.display());

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options(credentials));
    match builder.clone(url, path) {
        Ok(repo) => {
            info!("Successfully cloned to: {}", path.display());
            Ok(repo)
        }
        Err(e) => {
            monitor::fatal(format!("Clone of {} failed: {}", url, e));
            Err(e.into())
        }
    }
}

/// Open the working folder, cloning it first if needed. A repository without
/// commits gets exactly one empty initial commit.
pub fn ensure_working_folder(
    working_dir: &Path,
    url: &str,
    credentials: &CredentialCallback,
    signature: &SignatureConfig,
) -> Result<Repository, GitError> {
    let repo = if working_dir.join(".git").exists() {
        Repository::open(working_dir)?
    } else {
        if working_dir.exists() && working_dir.read_dir()?.next().is_some() {
            return Err(GitError::InvalidState(format!(
                "{} exists and is not a git repository",
                working_dir.display()
            )));
        }
        if let Some(parent) = working_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        clone_repository(url, working_dir, credentials)?
    };

    ensure_initial_commit(&repo, signature)?;
    Ok(repo)
}

/// Returns true if a commit was created
pub fn ensure_initial_commit(
    repo: &Repository,
    fallback: &SignatureConfig,
) -> Result<bool, GitError> {
    match repo.head() {
        Ok(_) => return Ok(false),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {}
        Err(e) => return Err(e.into()),
    }

    warn!("Repository has no commits; creating an empty initial commit");
    let signature = match repo.signature() {
        Ok(signature) => signature,
        Err(_) => Signature::now(&fallback.name, &fallback.email)?,
    };
    let tree_id = repo.index()?.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        INITIAL_COMMIT_MESSAGE,
        &tree,
        &[],
    )?;
    Ok(true)
}
