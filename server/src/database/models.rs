//! Database models
//!
//! Rust structs representing database entities.
//! All models use serde for serialization to HTTP clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::storage::ResourceKind;
use crate::validation::Category;

/// A note addressed by its access code
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: String,
    pub code: String,
    pub content: String,
    /// Encrypted PIN. Never sent to clients.
    #[serde(skip_serializing, default)]
    pub pin: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn has_pin(&self) -> bool {
        self.pin.as_deref().is_some_and(|pin| !pin.is_empty())
    }
}

/// File attachment linked to a note
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attachment {
    pub id: String,
    pub note_id: String,
    pub original_file_name: String,
    /// Unique name the object was stored under
    pub stored_identifier: String,
    pub category: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub remote_url: String,
    /// Store-side id, needed to delete the object
    #[serde(skip_serializing, default)]
    pub remote_object_id: String,
    #[serde(skip_serializing, default)]
    pub resource_kind: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Attachment {
    pub fn category(&self) -> Option<Category> {
        self.category.parse().ok()
    }

    /// Stored resource kind, falling back to the category's kind
    pub fn resource_kind(&self) -> ResourceKind {
        self.resource_kind.parse().unwrap_or_else(|_| {
            self.category()
                .map(ResourceKind::for_category)
                .unwrap_or(ResourceKind::Raw)
        })
    }
}

/// Metadata for a freshly uploaded object
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub note_id: String,
    pub original_file_name: String,
    pub stored_identifier: String,
    pub category: Category,
    pub content_type: String,
    pub size_bytes: i64,
    pub remote_url: String,
    pub remote_object_id: String,
    pub resource_kind: ResourceKind,
}
