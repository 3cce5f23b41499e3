// ABOUTME: Declared repositories that have not been opened yet
// Opening clones the origin when the working folder is missing

use std::path::Path;
use tracing::info;

use crate::config::RepositoryEntry;
use crate::credentials::{CredentialResolver, RepositoryKey, SecretStore};
use crate::git::remote::ensure_working_folder;
use crate::git::{GitError, OpenRepository, RepositorySettings};

/// Declaration record: where a repository lives and where it comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDeclaration {
    pub url: String,
    pub is_public: bool,
    /// Folder relative to the file-system root, `/`-separated
    pub folder: String,
    pub world: Option<String>,
    pub read_secret: Option<String>,
    pub write_secret: Option<String>,
}

impl RepositoryDeclaration {
    pub fn new(folder: impl Into<String>, url: impl Into<String>, is_public: bool) -> Self {
        Self {
            url: url.into(),
            is_public,
            folder: folder.into(),
            world: None,
            read_secret: None,
            write_secret: None,
        }
    }
}

impl From<&RepositoryEntry> for RepositoryDeclaration {
    fn from(entry: &RepositoryEntry) -> Self {
        Self {
            url: entry.url.clone(),
            is_public: entry.public,
            folder: entry.folder.clone(),
            world: entry.world.clone(),
            read_secret: entry.read_secret.clone(),
            write_secret: entry.write_secret.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtoState {
    Declared,
    /// Loaded; the repository is registered under this display path
    Opened { display_path: String },
    /// Last load attempt failed; the next load retries
    Failed(String),
    Closed,
}

#[derive(Debug)]
pub struct ProtoRepository {
    declaration: RepositoryDeclaration,
    key: RepositoryKey,
    state: ProtoState,
}

impl ProtoRepository {
    pub fn new(declaration: RepositoryDeclaration) -> Self {
        let key = RepositoryKey::new(declaration.url.clone(), declaration.is_public).with_secrets(
            declaration.read_secret.clone(),
            declaration.write_secret.clone(),
        );
        Self {
            declaration,
            key,
            state: ProtoState::Declared,
        }
    }

    pub fn folder(&self) -> &str {
        &self.declaration.folder
    }

    pub fn url(&self) -> &str {
        &self.declaration.url
    }

    pub fn world(&self) -> Option<&str> {
        self.declaration.world.as_deref()
    }

    pub fn key(&self) -> &RepositoryKey {
        &self.key
    }

    pub fn state(&self) -> &ProtoState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ProtoState::Opened { .. })
    }

    /// Display path of the repository this declaration opened
    pub fn opened_as(&self) -> Option<&str> {
        match &self.state {
            ProtoState::Opened { display_path } => Some(display_path),
            _ => None,
        }
    }

    pub(crate) fn needs_load(&self) -> bool {
        matches!(self.state, ProtoState::Declared | ProtoState::Failed(_))
    }

    pub(crate) fn set_state(&mut self, state: ProtoState) {
        self.state = state;
    }

    /// Open (cloning if needed) the working folder under `root`
    pub fn load(
        &self,
        root: &Path,
        settings: &RepositorySettings,
        secrets: &dyn SecretStore,
    ) -> Result<OpenRepository, GitError> {
        let mut working_dir = root.to_path_buf();
        working_dir.extend(self.folder().split('/'));

        let credentials = CredentialResolver::for_key(&self.key, secrets);
        let repo = ensure_working_folder(
            &working_dir,
            self.url(),
            &credentials,
            &settings.signature,
        )?;
        info!("Opened {} from {}", self.folder(), self.url());

        OpenRepository::new(
            repo,
            working_dir,
            self.folder(),
            self.key.clone(),
            credentials,
            settings.clone(),
        )
    }
}
