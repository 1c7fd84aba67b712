//! On-disk layout of the manager's state directory

use std::path::{Path, PathBuf};

use crate::filesys::file::File;

/// Overrides the platform default state directory
pub const HOME_ENV: &str = "DEPLOY_MANAGER_HOME";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Layout rooted at `$DEPLOY_MANAGER_HOME`, or the platform default
    pub fn from_env() -> Self {
        match std::env::var_os(HOME_ENV) {
            Some(home) if !home.is_empty() => Self::new(home),
            _ => Self::default(),
        }
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Snapshot of every deploy document
    pub fn documents_file(&self) -> File {
        File::new(self.base_dir.join("data").join("deploys.json"))
    }

    /// Relative paths from the settings file are taken from the base dir
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/var/lib/deploy-manager");

        #[cfg(not(target_os = "linux"))]
        let base_dir = PathBuf::from(".deploy-manager");

        Self::new(base_dir)
    }
}
