//! Filesystem object storage
//!
//! Stores objects under a root directory using the same folder layout as the
//! remote store: `root/codesafe/{key}/{category}/{uuid}_{stem}.{ext}`.
//! The object id is the path relative to the root and the URL points at the
//! server's `/files` route.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{
    folder_path, key_prefix, unique_name, validate_organizing_key, ObjectStorage, ResourceKind,
    StorageError, StoredObject,
};
use crate::error::Result;
use crate::validation::{extension_of, Category};

/// Local filesystem object store
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new store rooted at `root`, serving URLs under `base_url`
    pub fn new(root: PathBuf, base_url: impl Into<String>) -> Self {
        Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Initialize the store (create directory if needed)
    pub async fn initialize(&self) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        tracing::info!("Local object store initialized at: {:?}", self.root);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check if an object exists
    pub async fn exists(&self, object_id: &str) -> bool {
        match self.resolve(object_id) {
            Some(path) => fs::try_exists(path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Map an object id to a path, refusing anything that leaves the root
    fn resolve(&self, object_id: &str) -> Option<PathBuf> {
        let relative = Path::new(object_id);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));

        if object_id.is_empty() || !plain {
            return None;
        }
        Some(self.root.join(relative))
    }

    async fn write_object(&self, path: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Write to temp file first (atomic write)
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        fs::rename(temp_path, path).await
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload(
        &self,
        data: &[u8],
        category: Category,
        organizing_key: &str,
        file_name: &str,
    ) -> std::result::Result<StoredObject, StorageError> {
        validate_organizing_key(organizing_key)?;

        let stored_name = match extension_of(file_name) {
            Some(ext) => format!("{}.{}", unique_name(file_name), ext),
            None => unique_name(file_name),
        };
        let object_id = format!("{}/{}", folder_path(organizing_key, category), stored_name);
        let path = self.root.join(&object_id);

        self.write_object(&path, data)
            .await
            .map_err(|e| StorageError::Upload(format!("Failed to write {}: {}", object_id, e)))?;

        tracing::debug!("Stored object: {} ({} bytes)", object_id, data.len());

        Ok(StoredObject {
            url: format!("{}/files/{}", self.base_url, object_id),
            object_id,
            stored_name,
            resource_kind: ResourceKind::for_category(category),
        })
    }

    async fn delete(&self, object_id: &str, _kind: ResourceKind) -> bool {
        let Some(path) = self.resolve(object_id) else {
            tracing::warn!("Refusing to delete object outside store: {}", object_id);
            return false;
        };

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Deleted object: {}", object_id);
                true
            }
            // Already deleted
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::error!("Failed to delete object {}: {}", object_id, e);
                false
            }
        }
    }

    async fn delete_folder(&self, organizing_key: &str) -> bool {
        if validate_organizing_key(organizing_key).is_err() {
            return false;
        }

        let folder = self.root.join(key_prefix(organizing_key));
        match fs::remove_dir_all(&folder).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => {
                tracing::warn!("Failed to delete folder {:?}: {}", folder, e);
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
