//! Attachments service
//!
//! Validates uploads, stores the bytes in object storage and records the
//! metadata. Uploading is a two-step saga: the object is stored first, then
//! the row is inserted. If the insert fails the stored object is deleted
//! again so storage does not accumulate files no note points at.

use std::sync::Arc;

use crate::config::MAX_FILE_NAME_LENGTH;
use crate::database::{Attachment, NewAttachment, Repository};
use crate::error::{AppError, Result};
use crate::services::access::NoteAccess;
use crate::storage::ObjectStorage;
use crate::validation::{Category, FileRules};

/// A file received from a client
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    /// Category the client claims, checked against the extension
    pub declared_category: Option<Category>,
    pub data: Vec<u8>,
}

/// Service for managing attachments
#[derive(Clone)]
pub struct AttachmentsService {
    repo: Repository,
    storage: Arc<dyn ObjectStorage>,
    rules: Arc<FileRules>,
}

impl AttachmentsService {
    pub fn new(repo: Repository, storage: Arc<dyn ObjectStorage>, rules: Arc<FileRules>) -> Self {
        Self {
            repo,
            storage,
            rules,
        }
    }

    pub fn rules(&self) -> &FileRules {
        &self.rules
    }

    /// Validate, store and record a file for the note
    pub async fn upload(&self, access: &NoteAccess, upload: FileUpload) -> Result<Attachment> {
        let file_name = sanitize_filename(&upload.file_name);

        tracing::info!(
            "Uploading attachment: {} for note: {} (size: {} bytes)",
            file_name,
            access.code(),
            upload.data.len()
        );

        let category = self.rules.validate(
            &file_name,
            upload.declared_category,
            &upload.content_type,
            upload.data.len() as u64,
        )?;

        let stored = self
            .storage
            .upload(&upload.data, category, access.note_id(), &file_name)
            .await
            .map_err(|e| {
                tracing::error!("Upload of {} to {} failed: {}", file_name, self.storage.name(), e);
                AppError::from(e)
            })?;

        let content_type = upload.content_type.trim().to_string();

        let new = NewAttachment {
            note_id: access.note_id().to_string(),
            original_file_name: file_name,
            stored_identifier: stored.stored_name.clone(),
            category,
            content_type,
            size_bytes: upload.data.len() as i64,
            remote_url: stored.url.clone(),
            remote_object_id: stored.object_id.clone(),
            resource_kind: stored.resource_kind,
        };

        match self.repo.create_attachment(&new).await {
            Ok(attachment) => {
                tracing::info!("Attachment created: {}", attachment.id);
                Ok(attachment)
            }
            Err(source) => {
                let object_id = stored.object_id;

                if self.storage.delete(&object_id, stored.resource_kind).await {
                    tracing::error!(
                        "Failed to save metadata for {}, uploaded object rolled back: {}",
                        object_id,
                        source
                    );
                    Err(AppError::UploadRolledBack {
                        object_id,
                        source: Box::new(source),
                    })
                } else {
                    tracing::error!(
                        "Failed to save metadata for {} and could not delete it, object is orphaned: {}",
                        object_id,
                        source
                    );
                    Err(AppError::UploadOrphaned {
                        object_id,
                        source: Box::new(source),
                    })
                }
            }
        }
    }

    /// List attachments for a note, newest first
    pub async fn list_attachments(
        &self,
        access: &NoteAccess,
        category: Option<Category>,
    ) -> Result<Vec<Attachment>> {
        self.repo.list_attachments(access.note_id(), category).await
    }

    /// Get an attachment that belongs to the note
    pub async fn get_attachment(&self, access: &NoteAccess, attachment_id: &str) -> Result<Attachment> {
        self.repo
            .get_attachment(attachment_id)
            .await?
            .filter(|a| a.note_id == access.note_id())
            .ok_or_else(|| AppError::AttachmentNotFound(attachment_id.to_string()))
    }

    /// Delete an attachment. Returns false when the note has no such attachment.
    ///
    /// The remote delete is best-effort, the record is always removed.
    pub async fn delete_attachment(&self, access: &NoteAccess, attachment_id: &str) -> Result<bool> {
        let attachment = match self.get_attachment(access, attachment_id).await {
            Ok(attachment) => attachment,
            Err(AppError::AttachmentNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        tracing::info!("Deleting attachment: {}", attachment_id);
        self.remove(&attachment).await
    }

    /// Remove every attachment of a note, then sweep its storage folder.
    /// Returns how many records were removed.
    pub(crate) async fn delete_all_for_note(&self, note_id: &str) -> Result<usize> {
        let attachments = self.repo.list_attachments(note_id, None).await?;
        let mut removed = 0;

        for attachment in &attachments {
            if self.remove(attachment).await? {
                removed += 1;
            }
        }

        if !self.storage.delete_folder(note_id).await {
            tracing::warn!("Failed to sweep storage folder of note: {}", note_id);
        }

        Ok(removed)
    }

    async fn remove(&self, attachment: &Attachment) -> Result<bool> {
        if !self
            .storage
            .delete(&attachment.remote_object_id, attachment.resource_kind())
            .await
        {
            tracing::warn!(
                "Remote delete failed for attachment {} ({}), removing record anyway",
                attachment.id,
                attachment.remote_object_id
            );
        }

        self.repo.delete_attachment(&attachment.id).await
    }
}

/// Sanitize filename to prevent path traversal attacks
fn sanitize_filename(filename: &str) -> String {
    // Keep the last path component only, browsers may send a full client path
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    base.chars()
        .filter(|c| *c != '\0' && !c.is_control())
        .take(MAX_FILE_NAME_LENGTH)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PinCipher;
    use crate::database::create_memory_pool;
    use crate::services::access::AccessGuard;
    use crate::session::SessionStore;
    use crate::storage::memory::MemoryStorage;
    use crate::validation::ValidationError;
    use std::time::Duration;

    struct Fixture {
        service: AttachmentsService,
        storage: Arc<MemoryStorage>,
        repo: Repository,
        guard: AccessGuard,
    }

    async fn create_fixture() -> Fixture {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let service = AttachmentsService::new(
            repo.clone(),
            storage.clone(),
            Arc::new(FileRules::standard()),
        );
        let guard = AccessGuard::new(
            repo.clone(),
            PinCipher::new("test-secret").unwrap(),
            SessionStore::new(Duration::from_secs(60)),
        );
        Fixture {
            service,
            storage,
            repo,
            guard,
        }
    }

    async fn open_note(fixture: &Fixture, code: &str) -> NoteAccess {
        fixture.repo.create_note(code).await.unwrap();
        let (session, _) = fixture.guard.sessions().resume(None).await;
        fixture
            .guard
            .authorize(code, &session)
            .await
            .unwrap()
            .into_access()
            .unwrap()
    }

    fn file(name: &str, content_type: &str, data: &[u8]) -> FileUpload {
        FileUpload {
            file_name: name.to_string(),
            content_type: content_type.to_string(),
            declared_category: None,
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_upload_and_get_attachment() {
        let fixture = create_fixture().await;
        let access = open_note(&fixture, "ABC123").await;

        let attachment = fixture
            .service
            .upload(&access, file("photo.png", "image/png", b"\x89PNG"))
            .await
            .unwrap();

        assert_eq!(attachment.original_file_name, "photo.png");
        assert_eq!(attachment.category(), Some(Category::Image));
        assert_eq!(attachment.size_bytes, 4);
        assert!(fixture.storage.contains(&attachment.remote_object_id));
        assert!(attachment
            .remote_object_id
            .starts_with(&format!("codesafe/{}/image/", access.note_id())));

        let fetched = fixture
            .service
            .get_attachment(&access, &attachment.id)
            .await
            .unwrap();
        assert_eq!(fetched.remote_url, attachment.remote_url);
    }

    #[tokio::test]
    async fn test_rejected_upload_never_reaches_storage() {
        let fixture = create_fixture().await;
        let access = open_note(&fixture, "ABC123").await;

        let mut upload = file("payload.exe", "application/pdf", b"MZ");
        upload.declared_category = Some(Category::Document);

        let err = fixture.service.upload(&access, upload).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::File(ValidationError::ForbiddenExtension { .. })
        ));

        let err = fixture
            .service
            .upload(&access, file("empty.txt", "text/plain", b""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::File(ValidationError::EmptyFile)));

        assert_eq!(fixture.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn test_upload_timeout_is_reported() {
        let fixture = create_fixture().await;
        let access = open_note(&fixture, "ABC123").await;
        fixture.storage.time_out_uploads(true);

        let err = fixture
            .service
            .upload(&access, file("clip.mp4", "video/mp4", b"data"))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(fixture
            .service
            .list_attachments(&access, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_insert_rolls_back_upload() {
        let fixture = create_fixture().await;
        let access = open_note(&fixture, "ABC123").await;

        // The note disappears between authorization and insert
        fixture.repo.delete_note(access.note_id()).await.unwrap();

        let err = fixture
            .service
            .upload(&access, file("report.pdf", "application/pdf", b"%PDF"))
            .await
            .unwrap_err();

        match err {
            AppError::UploadRolledBack { object_id, source } => {
                assert!(matches!(*source, AppError::Database(_)));
                assert_eq!(fixture.storage.deleted(), vec![object_id.clone()]);
                assert!(!fixture.storage.contains(&object_id));
            }
            other => panic!("expected rollback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_rollback_reports_orphan() {
        let fixture = create_fixture().await;
        let access = open_note(&fixture, "ABC123").await;
        fixture.repo.delete_note(access.note_id()).await.unwrap();
        fixture.storage.fail_all_deletes(true);

        let err = fixture
            .service
            .upload(&access, file("report.pdf", "application/pdf", b"%PDF"))
            .await
            .unwrap_err();

        match err {
            AppError::UploadOrphaned { object_id, source } => {
                assert!(matches!(*source, AppError::Database(_)));
                assert!(fixture.storage.contains(&object_id));
            }
            other => panic!("expected orphan, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_attachments_by_category() {
        let fixture = create_fixture().await;
        let access = open_note(&fixture, "ABC123").await;

        fixture
            .service
            .upload(&access, file("a.pdf", "application/pdf", b"1"))
            .await
            .unwrap();
        fixture
            .service
            .upload(&access, file("b.png", "image/png", b"2"))
            .await
            .unwrap();
        fixture
            .service
            .upload(&access, file("c.jpg", "image/jpeg", b"3"))
            .await
            .unwrap();

        let all = fixture.service.list_attachments(&access, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].original_file_name, "c.jpg");

        let images = fixture
            .service
            .list_attachments(&access, Some(Category::Image))
            .await
            .unwrap();
        assert_eq!(images.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_checks_ownership() {
        let fixture = create_fixture().await;
        let mine = open_note(&fixture, "MINE").await;
        let theirs = open_note(&fixture, "THEIRS").await;

        let attachment = fixture
            .service
            .upload(&mine, file("a.txt", "text/plain", b"hello"))
            .await
            .unwrap();

        assert!(matches!(
            fixture.service.get_attachment(&theirs, &attachment.id).await,
            Err(AppError::AttachmentNotFound(_))
        ));
        assert!(!fixture
            .service
            .delete_attachment(&theirs, &attachment.id)
            .await
            .unwrap());

        assert!(fixture
            .service
            .delete_attachment(&mine, &attachment.id)
            .await
            .unwrap());
        assert!(!fixture.storage.contains(&attachment.remote_object_id));
        assert!(!fixture
            .service
            .delete_attachment(&mine, &attachment.id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_record_when_remote_fails() {
        let fixture = create_fixture().await;
        let access = open_note(&fixture, "ABC123").await;

        let attachment = fixture
            .service
            .upload(&access, file("a.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        fixture.storage.fail_delete_of(&attachment.remote_object_id);

        assert!(fixture
            .service
            .delete_attachment(&access, &attachment.id)
            .await
            .unwrap());
        assert!(fixture
            .service
            .list_attachments(&access, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("normal.txt"), "normal.txt");
        assert_eq!(sanitize_filename("../../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\file.txt"), "file.txt");
        assert_eq!(sanitize_filename("  spaced.pdf "), "spaced.pdf");
        assert_eq!(sanitize_filename("bad\0name.txt"), "badname.txt");
    }
}
