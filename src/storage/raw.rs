//! Raw response body store
//!
//! Bodies are written to `<dir>/<sha256(url)>.html`, so rewriting the same
//! URL replaces its file instead of adding a new one.

use crate::storage::StorageResult;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RawStore {
    dir: PathBuf,
}

impl RawStore {
    /// Opens the store, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the body for `url` is stored under
    pub fn path_for(&self, url: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        self.dir.join(format!("{}.html", hex::encode(hasher.finalize())))
    }

    /// Writes the body for `url` and returns the file path
    pub async fn write(&self, url: &str, body: &[u8]) -> StorageResult<PathBuf> {
        let path = self.path_for(url);
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
