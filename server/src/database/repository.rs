//! Repository layer for database operations
//!
//! CRUD operations for notes and attachment metadata.

use super::models::*;
use crate::error::{AppError, Result};
use crate::validation::Category;
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for database operations
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a new empty note. The code must not be taken.
    pub async fn create_note(&self, code: &str) -> Result<Note> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let note = sqlx::query_as::<_, Note>(
            r#"
            INSERT INTO notes (id, code, content, pin, created_at, updated_at)
            VALUES (?, ?, '', NULL, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(code)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::NoteAlreadyExists(code.to_string())
            }
            other => AppError::Database(other),
        })?;

        tracing::debug!("Created note: {}", id);
        Ok(note)
    }

    /// Get a note by ID
    pub async fn get_note(&self, id: &str) -> Result<Note> {
        self.find_note(id)
            .await?
            .ok_or_else(|| AppError::NoteNotFound(id.to_string()))
    }

    pub async fn find_note(&self, id: &str) -> Result<Option<Note>> {
        let note = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(note)
    }

    /// Exact, case-sensitive code lookup
    pub async fn find_note_by_code(&self, code: &str) -> Result<Option<Note>> {
        let note = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(note)
    }

    /// Replace the note's content
    pub async fn update_note_content(&self, id: &str, content: &str) -> Result<Note> {
        let note = sqlx::query_as::<_, Note>(
            r#"
            UPDATE notes SET content = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(content)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NoteNotFound(id.to_string()))?;

        tracing::debug!("Updated content of note: {}", id);
        Ok(note)
    }

    /// Set or clear the stored (encrypted) PIN
    pub async fn set_note_pin(&self, id: &str, sealed_pin: Option<&str>) -> Result<Note> {
        let note = sqlx::query_as::<_, Note>(
            r#"
            UPDATE notes SET pin = ?, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(sealed_pin)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NoteNotFound(id.to_string()))?;

        tracing::debug!(
            "{} PIN of note: {}",
            if sealed_pin.is_some() { "Set" } else { "Cleared" },
            id
        );
        Ok(note)
    }

    /// Permanently delete a note; attachment rows cascade.
    /// Returns false when no such note existed.
    pub async fn delete_note(&self, id: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Deleted note: {} ({} row)", id, rows);
        Ok(rows > 0)
    }

    /// Create an attachment
    pub async fn create_attachment(&self, new: &NewAttachment) -> Result<Attachment> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let attachment = sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO attachments (
                id, note_id, original_file_name, stored_identifier, category, content_type,
                size_bytes, remote_url, remote_object_id, resource_kind, uploaded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&new.note_id)
        .bind(&new.original_file_name)
        .bind(&new.stored_identifier)
        .bind(new.category.as_str())
        .bind(&new.content_type)
        .bind(new.size_bytes)
        .bind(&new.remote_url)
        .bind(&new.remote_object_id)
        .bind(new.resource_kind.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Created attachment: {} for note: {}", id, new.note_id);
        Ok(attachment)
    }

    pub async fn get_attachment(&self, id: &str) -> Result<Option<Attachment>> {
        let attachment = sqlx::query_as::<_, Attachment>("SELECT * FROM attachments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(attachment)
    }

    /// List attachments for a note, newest first, optionally by category
    pub async fn list_attachments(
        &self,
        note_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<Attachment>> {
        let attachments = match category {
            Some(category) => {
                sqlx::query_as::<_, Attachment>(
                    r#"
                    SELECT * FROM attachments
                    WHERE note_id = ? AND category = ?
                    ORDER BY uploaded_at DESC, rowid DESC
                    "#,
                )
                .bind(note_id)
                .bind(category.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Attachment>(
                    r#"
                    SELECT * FROM attachments
                    WHERE note_id = ?
                    ORDER BY uploaded_at DESC, rowid DESC
                    "#,
                )
                .bind(note_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(attachments)
    }

    /// Delete an attachment row. Returns false when it did not exist.
    pub async fn delete_attachment(&self, id: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM attachments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        tracing::debug!("Deleted attachment: {}", id);
        Ok(rows > 0)
    }
}
