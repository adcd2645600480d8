//! Resolves the storage locations handed to the orchestrator.
//!
//! The private storage directory plays the role of an application's files
//! directory: it must exist, and its parent hosts the daemon instance
//! directory. The content directory is optional removable storage; it is
//! probed later by the content store and never created here.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

/// Storage locations derived from the configuration.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    files_dir: PathBuf,
    content_dir: Option<PathBuf>,
}

impl StoragePaths {
    /// Derives the storage paths and creates the private storage directory.
    pub fn from_config(config: &Config) -> Result<Self, StoragePathsError> {
        let files_dir = config.storage_dir().as_std_path().to_path_buf();
        if files_dir.parent().is_none_or(|parent| parent.as_os_str().is_empty()) {
            return Err(StoragePathsError::MissingParent { path: files_dir });
        }
        fs::create_dir_all(&files_dir).map_err(|source| StoragePathsError::StorageDirectory {
            path: files_dir.clone(),
            source,
        })?;
        Ok(Self {
            files_dir,
            content_dir: config
                .content_dir()
                .map(|dir| dir.as_std_path().to_path_buf()),
        })
    }

    /// Private storage directory.
    pub fn files_dir(&self) -> &Path {
        self.files_dir.as_path()
    }

    /// Optional content store location.
    pub fn content_dir(&self) -> Option<&Path> {
        self.content_dir.as_deref()
    }
}

/// Errors raised while deriving storage paths.
#[derive(Debug, Error)]
pub enum StoragePathsError {
    /// The storage directory has no parent to host the instance directory.
    #[error("storage directory '{}' has no parent directory", path.display())]
    MissingParent { path: PathBuf },
    /// Creating the storage directory failed.
    #[error("failed to prepare storage directory '{}': {source}", path.display())]
    StorageDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
