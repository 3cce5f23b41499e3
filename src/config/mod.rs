// ABOUTME: Configuration management for gitvfs
// Handles branch-workflow names, committer fallback, diff settings and repository declarations

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::credentials::DEFAULT_SERVICE_NAME;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application version
    #[serde(default = "default_version")]
    pub version: String,

    /// Root directory of the virtual file system (defaults to the current directory)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Branch promotion workflow
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Committer identity used when the repository has none
    #[serde(default)]
    pub signature: SignatureConfig,

    /// Diff computation
    #[serde(default)]
    pub diff: DiffConfig,

    /// Secret storage
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Declared repositories
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Scratch branch
    #[serde(default = "default_local_branch")]
    pub local_branch: String,

    /// Integration branch
    #[serde(default = "default_develop_branch")]
    pub develop_branch: String,

    /// Release branch
    #[serde(default = "default_master_branch")]
    pub master_branch: String,

    /// Remote that branches track and are pushed to
    #[serde(default = "default_origin_remote")]
    pub origin_remote: String,

    /// Message used when a switch commits pending work automatically
    #[serde(default = "default_auto_commit_message")]
    pub auto_commit_message: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            local_branch: default_local_branch(),
            develop_branch: default_develop_branch(),
            master_branch: default_master_branch(),
            origin_remote: default_origin_remote(),
            auto_commit_message: default_auto_commit_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureConfig {
    #[serde(default = "default_signature_name")]
    pub name: String,

    #[serde(default = "default_signature_email")]
    pub email: String,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            name: default_signature_name(),
            email: default_signature_email(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Commits by this committer name are left out of diff messages
    #[serde(default)]
    pub bot_committer_name: Option<String>,

    /// Commits by this committer email are left out of diff messages
    #[serde(default)]
    pub bot_committer_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Keychain service the secrets are stored under
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for JSONL log files (default: ~/.gitvfs/logs)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filter: default_log_filter(),
        }
    }
}

/// One declared repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// Origin URL
    pub url: String,

    /// Folder relative to the VFS root
    pub folder: String,

    #[serde(default)]
    pub public: bool,

    /// Name of the world this repository belongs to
    #[serde(default)]
    pub world: Option<String>,

    #[serde(default)]
    pub read_secret: Option<String>,

    #[serde(default)]
    pub write_secret: Option<String>,
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_local_branch() -> String {
    "local".to_string()
}

fn default_develop_branch() -> String {
    "develop".to_string()
}

fn default_master_branch() -> String {
    "master".to_string()
}

fn default_origin_remote() -> String {
    "origin".to_string()
}

fn default_auto_commit_message() -> String {
    "Automatic commit before switching branch".to_string()
}

fn default_signature_name() -> String {
    "gitvfs".to_string()
}

fn default_signature_email() -> String {
    "gitvfs@localhost".to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_log_filter() -> String {
    "gitvfs=info".to_string()
}

impl AppConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Lowest precedence first so later files win
        for path in Self::get_config_paths().into_iter().rev() {
            if path.exists() {
                let file_config = Self::load_from_file(&path)?;
                config.merge(file_config);
            }
        }

        Ok(config)
    }

    /// Load a single configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Save configuration to user config directory
    pub fn save(&self) -> Result<()> {
        let config_dir = Self::get_user_config_dir()?;
        self.save_to(&config_dir.join("config.toml"))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get configuration file paths in order of precedence
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        // 1. Local project config
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(".gitvfs").join("config.toml"));
        }

        // 2. User config (~/.gitvfs/config/config.toml)
        if let Ok(config_dir) = Self::get_user_config_dir() {
            paths.push(config_dir.join("config.toml"));
        }

        // 3. System config
        paths.push(PathBuf::from("/etc/gitvfs/config.toml"));

        paths
    }

    fn get_user_config_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".gitvfs").join("config"))
    }

    /// Directory for log files
    pub fn log_dir(&self) -> PathBuf {
        self.logging.directory.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(".gitvfs").join("logs"))
                .unwrap_or_else(|| PathBuf::from(".gitvfs/logs"))
        })
    }

    /// Merge another config into this one
    fn merge(&mut self, other: AppConfig) {
        // Don't override version
        if other.root.is_some() {
            self.root = other.root;
        }

        // Sections are taken whole when they differ from the defaults
        if other.workflow != WorkflowConfig::default() {
            self.workflow = other.workflow;
        }
        if other.signature != SignatureConfig::default() {
            self.signature = other.signature;
        }
        if other.diff != DiffConfig::default() {
            self.diff = other.diff;
        }
        if other.credentials.service_name != default_service_name() {
            self.credentials.service_name = other.credentials.service_name;
        }
        if other.logging.directory.is_some() {
            self.logging.directory = other.logging.directory;
        }
        if other.logging.filter != default_log_filter() {
            self.logging.filter = other.logging.filter;
        }

        // Declarations accumulate; the VFS deduplicates by folder
        self.repositories.extend(other.repositories);
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            root: None,
            workflow: WorkflowConfig::default(),
            signature: SignatureConfig::default(),
            diff: DiffConfig::default(),
            credentials: CredentialsConfig::default(),
            logging: LoggingConfig::default(),
            repositories: Vec::new(),
        }
    }
}
