//! Object storage module
//!
//! Attachment bytes never touch the database. They live in an object store
//! behind the [`ObjectStorage`] trait: a Cloudinary-compatible HTTP backend
//! for production and a local filesystem backend for development and tests.
//!
//! Objects are grouped as `codesafe/{organizing_key}/{category}/{stored_name}`
//! so everything belonging to one note can be swept with a single prefix delete.

pub mod cloud;
pub mod local;
#[cfg(test)]
pub mod memory;

pub use cloud::CloudStorage;
pub use local::LocalStorage;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::STORAGE_FOLDER_PREFIX;
use crate::validation::Category;

/// Longest file stem kept in a stored object name
const MAX_STEM_LENGTH: usize = 100;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Upload timed out: {0}")]
    Timeout(String),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout(_))
    }
}

/// Resource type the remote API files an object under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Video,
    Raw,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Image, ResourceKind::Video, ResourceKind::Raw];

    pub fn for_category(category: Category) -> Self {
        match category {
            Category::Image => ResourceKind::Image,
            Category::Video => ResourceKind::Video,
            Category::Document | Category::Other => ResourceKind::Raw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Video => "video",
            ResourceKind::Raw => "raw",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(ResourceKind::Image),
            "video" => Ok(ResourceKind::Video),
            "raw" => Ok(ResourceKind::Raw),
            other => Err(StorageError::Config(format!("Unknown resource kind: {}", other))),
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Where clients fetch the object
    pub url: String,
    /// Store-side identifier used for deletion
    pub object_id: String,
    /// Unique name the object was stored under
    pub stored_name: String,
    pub resource_kind: ResourceKind,
}

/// Remote object store
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store bytes under `codesafe/{organizing_key}/{category}`.
    ///
    /// Every call produces a fresh unique object, names never collide.
    async fn upload(
        &self,
        data: &[u8],
        category: Category,
        organizing_key: &str,
        file_name: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Delete one object. "Already gone" counts as success.
    /// Failures are reported as `false`, never raised.
    async fn delete(&self, object_id: &str, kind: ResourceKind) -> bool;

    /// Best-effort delete of everything under an organizing key
    async fn delete_folder(&self, organizing_key: &str) -> bool;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Folder for objects of one note and category
pub fn folder_path(organizing_key: &str, category: Category) -> String {
    format!("{}/{}", key_prefix(organizing_key), category.as_str())
}

/// Prefix covering everything stored for an organizing key
pub fn key_prefix(organizing_key: &str) -> String {
    format!("{}/{}", STORAGE_FOLDER_PREFIX, organizing_key)
}

/// Organizing keys become path segments and must not escape their folder
pub fn validate_organizing_key(organizing_key: &str) -> Result<(), StorageError> {
    let valid = !organizing_key.is_empty()
        && organizing_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::Config(format!(
            "Invalid organizing key: {:?}",
            organizing_key
        )))
    }
}

/// Unique object name: `{uuid}_{sanitized stem}`
pub fn unique_name(file_name: &str) -> String {
    let stem = safe_stem(file_name);
    let id = Uuid::new_v4().simple().to_string();
    if stem.is_empty() {
        id
    } else {
        format!("{}_{}", id, stem)
    }
}

/// File stem reduced to `[A-Za-z0-9_-]`
pub fn safe_stem(file_name: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };

    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LENGTH)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_for_category() {
        assert_eq!(ResourceKind::for_category(Category::Image), ResourceKind::Image);
        assert_eq!(ResourceKind::for_category(Category::Video), ResourceKind::Video);
        assert_eq!(ResourceKind::for_category(Category::Document), ResourceKind::Raw);
        assert_eq!(ResourceKind::for_category(Category::Other), ResourceKind::Raw);
        assert_eq!("raw".parse::<ResourceKind>().unwrap(), ResourceKind::Raw);
        assert!("audio".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_folder_path() {
        assert_eq!(folder_path("abc", Category::Image), "codesafe/abc/image");
        assert_eq!(key_prefix("abc"), "codesafe/abc");
    }

    #[test]
    fn test_organizing_key_validation() {
        assert!(validate_organizing_key("3f2a-99_b").is_ok());
        assert!(validate_organizing_key("").is_err());
        assert!(validate_organizing_key("../etc").is_err());
        assert!(validate_organizing_key("a/b").is_err());
    }

    #[test]
    fn test_unique_names_differ() {
        let a = unique_name("My Report (final).pdf");
        let b = unique_name("My Report (final).pdf");

        assert_ne!(a, b);
        assert!(a.ends_with("_My_Report__final_"));
    }

    #[test]
    fn test_safe_stem() {
        assert_eq!(safe_stem("C:\\tmp\\cat.png"), "cat");
        assert_eq!(safe_stem(".hidden"), "_hidden");
        assert_eq!(safe_stem("archive.tar.gz"), "archive_tar");
    }
}
