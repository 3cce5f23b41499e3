// ABOUTME: Top-level virtual file system routing paths to open repositories or the plain disk
// Owns the declared repositories and the single OpenRepository per working directory

pub mod node;
pub mod proto;
pub mod tree;

use anyhow::Context;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::commands::CommandRegistry;
use crate::config::AppConfig;
use crate::credentials::{KeyringSecretStore, SecretStore};
use crate::git::{GitError, OpenRepository, RepositorySettings};
use crate::models::SimpleStatus;
use crate::monitor;
use crate::plugins::PluginManager;

pub use node::{FileInfo, FileKind};
pub use proto::{ProtoRepository, ProtoState, RepositoryDeclaration};
pub use tree::{VirtualNode, VirtualTree};

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("'{0}' is not writable")]
    NotWritable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the plugin manager of a repository when it is opened
pub type PluginFactory = Box<dyn Fn(&ProtoRepository) -> Box<dyn PluginManager> + Send>;

pub struct VirtualFileSystem {
    root: PathBuf,
    settings: RepositorySettings,
    secrets: Arc<dyn SecretStore>,
    registry: Option<Arc<dyn CommandRegistry>>,
    plugin_factory: Option<PluginFactory>,
    declared: Vec<ProtoRepository>,
    /// Keyed by display path
    open: BTreeMap<String, OpenRepository>,
}

impl VirtualFileSystem {
    pub fn new(
        root: impl Into<PathBuf>,
        settings: RepositorySettings,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            root: root.into(),
            settings,
            secrets,
            registry: None,
            plugin_factory: None,
            declared: Vec::new(),
            open: BTreeMap::new(),
        }
    }

    /// File system over the configured root with every configured repository declared
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let root = match &config.root {
            Some(root) => root.clone(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let secrets = Arc::new(KeyringSecretStore::new(&config.credentials.service_name));
        let mut vfs = Self::new(root, RepositorySettings::from(config), secrets);

        for entry in &config.repositories {
            vfs.declare_with(RepositoryDeclaration::from(entry))
                .with_context(|| format!("Invalid repository declaration '{}'", entry.folder))?;
        }
        Ok(vfs)
    }

    pub fn with_registry(mut self, registry: Arc<dyn CommandRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_plugin_factory(mut self, factory: PluginFactory) -> Self {
        self.plugin_factory = Some(factory);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Declare a repository; declaring the same folder twice returns the first declaration
    pub fn declare(
        &mut self,
        folder: &str,
        url: &str,
        is_public: bool,
    ) -> Result<&ProtoRepository, VfsError> {
        self.declare_with(RepositoryDeclaration::new(folder, url, is_public))
    }

    pub fn declare_with(
        &mut self,
        mut declaration: RepositoryDeclaration,
    ) -> Result<&ProtoRepository, VfsError> {
        declaration.folder = normalize_path(&declaration.folder)?;
        if declaration.folder.is_empty() {
            return Err(VfsError::InvalidPath(
                "repository folder cannot be empty".to_string(),
            ));
        }

        let index = match self
            .declared
            .iter()
            .position(|proto| proto.folder() == declaration.folder)
        {
            Some(index) => index,
            None => {
                info!("Declared {} ({})", declaration.folder, declaration.url);
                self.declared.push(ProtoRepository::new(declaration));
                self.declared.len() - 1
            }
        };
        Ok(&self.declared[index])
    }

    pub fn declared(&self) -> &[ProtoRepository] {
        &self.declared
    }

    /// Open every declared repository not open yet.
    ///
    /// Returns the display paths opened by this call and whether any failed.
    pub fn load_all(&mut self) -> (Vec<String>, bool) {
        let _group = monitor::open_group("load repositories");
        let mut opened = Vec::new();
        let mut has_errors = false;

        for proto in self.declared.iter_mut().filter(|proto| proto.needs_load()) {
            match proto.load(&self.root, &self.settings, self.secrets.as_ref()) {
                Ok(mut repo) => {
                    if let Some(factory) = &self.plugin_factory {
                        repo.set_plugin_manager(factory(proto));
                    }
                    if let Some(registry) = &self.registry {
                        repo.attach_registry(registry.clone());
                    }
                    let display_path = repo.display_path().to_string();
                    self.open.insert(display_path.clone(), repo);
                    proto.set_state(ProtoState::Opened {
                        display_path: display_path.clone(),
                    });
                    opened.push(display_path);
                }
                Err(e) => {
                    error!("Could not open {}: {}", proto.folder(), e);
                    proto.set_state(ProtoState::Failed(e.to_string()));
                    has_errors = true;
                }
            }
        }

        (opened, has_errors)
    }

    pub fn repository(&self, display_path: &str) -> Option<&OpenRepository> {
        self.open.get(display_path)
    }

    pub fn repository_mut(&mut self, display_path: &str) -> Option<&mut OpenRepository> {
        self.open.get_mut(display_path)
    }

    /// Repository opened from `proto`, if it is still open
    pub fn repository_for(&self, proto: &ProtoRepository) -> Option<&OpenRepository> {
        proto
            .opened_as()
            .and_then(|display_path| self.open.get(display_path))
    }

    pub fn open_repositories(&self) -> impl Iterator<Item = &OpenRepository> {
        self.open.values()
    }

    /// Open repository with the longest display path containing `normalized`,
    /// and the remainder of the path inside it
    fn route(&self, normalized: &str) -> Option<(String, String)> {
        self.open
            .keys()
            .filter_map(|display_path| {
                if normalized == display_path {
                    Some((display_path.clone(), String::new()))
                } else {
                    normalized
                        .strip_prefix(display_path.as_str())
                        .and_then(|rest| rest.strip_prefix('/'))
                        .map(|rest| (display_path.clone(), rest.to_string()))
                }
            })
            .max_by_key(|(display_path, _)| display_path.len())
    }

    fn physical(&self, normalized: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(normalized.split('/').filter(|s| !s.is_empty()));
        path
    }

    pub fn get_file_info(&mut self, path: &str) -> Result<Option<FileInfo>, VfsError> {
        let normalized = normalize_path(path)?;
        if let Some((mut tree, relative)) = self.tree_for(&normalized) {
            return tree.get_file_info(&relative);
        }

        let physical = self.physical(&normalized);
        if !physical.exists() {
            return Ok(None);
        }
        let name = normalized.rsplit('/').next().unwrap_or_default().to_string();
        Ok(Some(FileInfo::from_physical(name, normalized, &physical)?))
    }

    pub fn get_directory_contents(&mut self, path: &str) -> Result<Vec<FileInfo>, VfsError> {
        let normalized = normalize_path(path)?;
        if let Some((mut tree, relative)) = self.tree_for(&normalized) {
            return tree.get_directory_contents(&relative);
        }

        let physical = self.physical(&normalized);
        if !physical.is_dir() {
            return Err(VfsError::NotFound(normalized));
        }
        let mut contents = Vec::new();
        for entry in fs::read_dir(&physical)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = if normalized.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", normalized, name)
            };
            contents.push(FileInfo::from_physical(name, child, &entry.path())?);
        }
        contents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(contents)
    }

    pub fn read_bytes(&mut self, path: &str) -> Result<Vec<u8>, VfsError> {
        let normalized = normalize_path(path)?;
        if let Some((mut tree, relative)) = self.tree_for(&normalized) {
            return tree.read_bytes(&relative);
        }

        let physical = self.physical(&normalized);
        if !physical.is_file() {
            return Err(VfsError::NotFound(normalized));
        }
        Ok(fs::read(physical)?)
    }

    pub fn read_text(&mut self, path: &str) -> Result<String, VfsError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|e| {
            VfsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    fn tree_for(&mut self, normalized: &str) -> Option<(VirtualTree<'_>, String)> {
        let (display_path, relative) = self.route(normalized)?;
        let repo = self.open.get_mut(&display_path)?;
        Some((VirtualTree::new(repo), relative))
    }

    /// Physical location a write to `normalized` lands on
    fn writable_target(&mut self, normalized: &str) -> Result<PathBuf, VfsError> {
        if normalized.is_empty() {
            return Err(VfsError::NotWritable("/".to_string()));
        }
        if let Some((mut tree, relative)) = self.tree_for(normalized) {
            return match tree.resolve(&relative)? {
                Some(VirtualNode::Head { physical }) => Ok(physical),
                Some(_) | None => Err(VfsError::NotWritable(normalized.to_string())),
            };
        }
        // Folders holding open repositories are not touched through the plain file system
        let holds_repository = self
            .open
            .keys()
            .any(|display_path| display_path.starts_with(&format!("{}/", normalized)));
        if holds_repository {
            return Err(VfsError::NotWritable(normalized.to_string()));
        }
        Ok(self.physical(normalized))
    }

    /// Copy a file (from the working tree, a snapshot or the plain disk) to a writable destination
    pub fn copy_to(&mut self, source: &str, destination: &str) -> bool {
        let result = self.copy_file(source, destination);
        report("copy", destination, result)
    }

    fn copy_file(&mut self, source: &str, destination: &str) -> Result<(), VfsError> {
        let content = self.read_bytes(source)?;
        let target = self.writable_target(&normalize_path(destination)?)?;
        write_file(&target, &content)
    }

    pub fn write_text(&mut self, content: &str, destination: &str) -> bool {
        let result = normalize_path(destination)
            .and_then(|normalized| self.writable_target(&normalized))
            .and_then(|target| write_file(&target, content.as_bytes()));
        report("write", destination, result)
    }

    pub fn delete(&mut self, path: &str) -> bool {
        let result = normalize_path(path)
            .and_then(|normalized| self.writable_target(&normalized))
            .and_then(|target| {
                if target.join(".git").exists() {
                    return Err(VfsError::NotWritable(path.to_string()));
                }
                if target.is_dir() {
                    fs::remove_dir_all(&target)?;
                } else if target.exists() {
                    fs::remove_file(&target)?;
                } else {
                    return Err(VfsError::NotFound(path.to_string()));
                }
                Ok(())
            });
        report("delete", path, result)
    }

    pub fn ensure_directory(&mut self, path: &str) -> bool {
        let result = normalize_path(path)
            .and_then(|normalized| self.writable_target(&normalized))
            .and_then(|target| {
                if target.is_file() {
                    return Err(VfsError::InvalidPath(format!("{} is a file", path)));
                }
                fs::create_dir_all(&target)?;
                Ok(())
            });
        report("create directory", path, result)
    }

    /// Drop the branch snapshots of one repository
    pub fn invalidate(&mut self, display_path: &str) -> bool {
        match self.open.get_mut(display_path) {
            Some(repo) => {
                repo.invalidate_snapshots();
                true
            }
            None => false,
        }
    }

    /// Dispose one open repository
    pub fn close(&mut self, display_path: &str) -> bool {
        let Some(repo) = self.open.remove(display_path) else {
            return false;
        };
        repo.dispose();
        if let Some(proto) = self
            .declared
            .iter_mut()
            .find(|p| p.opened_as() == Some(display_path))
        {
            proto.set_state(ProtoState::Closed);
        }
        true
    }

    pub fn close_all(&mut self) {
        let open: Vec<String> = self.open.keys().cloned().collect();
        for display_path in open {
            self.close(&display_path);
        }
    }

    /// Status of every open repository; failures are logged and skipped
    pub fn status(&self) -> Vec<SimpleStatus> {
        self.open
            .values()
            .filter_map(|repo| match repo.status() {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!("No status for {}: {}", repo.display_path(), e);
                    None
                }
            })
            .collect()
    }
}

impl Drop for VirtualFileSystem {
    fn drop(&mut self) {
        self.close_all();
    }
}

/// `/`-separated, without empty or `.` segments. `..` is rejected.
pub fn normalize_path(path: &str) -> Result<String, VfsError> {
    let mut segments = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => return Err(VfsError::InvalidPath(path.to_string())),
            segment => segments.push(segment),
        }
    }
    Ok(segments.join("/"))
}

fn write_file(target: &Path, content: &[u8]) -> Result<(), VfsError> {
    if target.is_dir() {
        return Err(VfsError::InvalidPath(format!(
            "{} is a directory",
            target.display()
        )));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(target, content)?;
    Ok(())
}

fn report(operation: &str, path: &str, result: Result<(), VfsError>) -> bool {
    match result {
        Ok(()) => true,
        Err(VfsError::Io(e)) => {
            monitor::fatal(format!("{} of {} failed: {}", operation, path, e));
            false
        }
        Err(e) => {
            error!("Cannot {} {}: {}", operation, path, e);
            false
        }
    }
}
