//! JSON files written with replace-on-rename

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::ManagerError;

/// A file on disk addressed by path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, ManagerError> {
        let contents = fs::read(&self.path).await?;
        serde_json::from_slice(&contents).map_err(|e| {
            ManagerError::ConfigError(format!("{} is not valid JSON: {e}", self.path.display()))
        })
    }

    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), ManagerError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&contents).await
    }

    /// Sibling temp file, so the rename never crosses filesystems
    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(".");
        name.push(self.path.file_name().unwrap_or_default());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Readers see either the previous contents or `contents`, never a mix
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), ManagerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        let mut temp = fs::File::create(&temp_path).await?;
        temp.write_all(contents).await?;
        temp.sync_all().await?;
        drop(temp);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
