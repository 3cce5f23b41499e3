// ABOUTME: File metadata returned by the virtual file system

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    /// Path inside the virtual namespace
    pub path: String,
    pub kind: FileKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Only nodes backed by the working directory or the plain file system have one
    pub physical_path: Option<PathBuf>,
}

impl FileInfo {
    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: FileKind::Directory,
            size: 0,
            modified: None,
            physical_path: None,
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            kind: FileKind::File,
            size,
            ..Self::directory(name, path)
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_physical_path(mut self, physical: PathBuf) -> Self {
        self.physical_path = Some(physical);
        self
    }

    /// Metadata of an on-disk file or directory
    pub fn from_physical(
        name: impl Into<String>,
        path: impl Into<String>,
        physical: &Path,
    ) -> std::io::Result<Self> {
        let metadata = fs::metadata(physical)?;
        let info = if metadata.is_dir() {
            Self::directory(name, path)
        } else {
            Self::file(name, path, metadata.len())
        };
        let info = match metadata.modified() {
            Ok(modified) => info.with_modified(modified.into()),
            Err(_) => info,
        };
        Ok(info.with_physical_path(physical.to_path_buf()))
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Writes go through the physical path
    pub fn is_writable(&self) -> bool {
        self.physical_path.is_some()
    }
}
