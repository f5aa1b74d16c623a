//! File-per-key disk tier

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::{debug, trace};

use crate::error::{Result, StoreError};

/// The on-disk cache tier.
///
/// Each key maps to one file under the store directory, named by the
/// url-encoded form of the key; the file content is the JSON-serialized
/// value with no wrapping envelope. Layout:
/// `<root>/stores/<url-encoded store name>/<url-encoded key>`.
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Resolve and create the directory for the named store.
    pub async fn prepare(root: &Path, name: &str) -> Result<Self> {
        let dir = root
            .join("stores")
            .join(urlencoding::encode(name).into_owned());
        fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "disk store ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(urlencoding::encode(key).into_owned())
    }

    /// Read and deserialize the value for a key. `None` when absent.
    pub async fn read(&self, key: &str) -> Result<Option<Value>> {
        let path = self.entry_path(key);
        match fs::read_to_string(&path).await {
            Ok(text) => {
                trace!(key, "disk hit");
                let value = serde_json::from_str(&text)
                    .map_err(|err| StoreError::Deserialization(err.to_string()))?;
                Ok(Some(value))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Serialize and write the value for a key, overwriting any previous
    /// file.
    pub async fn write(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        fs::write(self.entry_path(key), text).await?;
        Ok(())
    }

    /// Delete the file for a key. No-op when absent.
    pub async fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete every file and subdirectory under the store directory, then
    /// the directory itself.
    pub async fn destroy(self) -> Result<()> {
        debug!(dir = %self.dir.display(), "destroying disk store");
        fs::remove_dir_all(&self.dir).await?;
        Ok(())
    }
}

impl std::fmt::Debug for DiskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStore").field("dir", &self.dir).finish()
    }
}
