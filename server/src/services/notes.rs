//! Notes service
//!
//! High-level business logic for notes: creation by code, content saves,
//! the PIN lifecycle and destruction of a note together with its files.

use crate::config::{MAX_CODE_LENGTH, MAX_CONTENT_LENGTH, MAX_PIN_LENGTH, MIN_PIN_LENGTH};
use crate::database::{Note, Repository};
use crate::error::{AppError, Result};
use crate::services::access::{AccessGuard, NoteAccess};
use crate::services::attachments::AttachmentsService;

/// Service for managing notes
#[derive(Clone)]
pub struct NotesService {
    repo: Repository,
    guard: AccessGuard,
    attachments: AttachmentsService,
}

impl NotesService {
    pub fn new(repo: Repository, guard: AccessGuard, attachments: AttachmentsService) -> Self {
        Self {
            repo,
            guard,
            attachments,
        }
    }

    /// Create a new empty note
    pub async fn create_note(&self, code: &str) -> Result<Note> {
        validate_code(code)?;

        tracing::info!("Creating new note: {}", code);
        let note = self.repo.create_note(code).await?;
        tracing::info!("Note created successfully: {}", note.id);

        Ok(note)
    }

    /// Return the note for a code, creating it when the code is new
    pub async fn open_note(&self, code: &str) -> Result<Note> {
        validate_code(code)?;

        if let Some(note) = self.repo.find_note_by_code(code).await? {
            return Ok(note);
        }

        match self.repo.create_note(code).await {
            Ok(note) => {
                tracing::info!("Note created on open: {}", code);
                Ok(note)
            }
            // Another request created it first
            Err(AppError::NoteAlreadyExists(_)) => self
                .repo
                .find_note_by_code(code)
                .await?
                .ok_or_else(|| AppError::NoteNotFound(code.to_string())),
            Err(e) => Err(e),
        }
    }

    pub async fn get_note_by_code(&self, code: &str) -> Result<Option<Note>> {
        self.repo.find_note_by_code(code).await
    }

    /// Replace the note's content
    pub async fn save_content(&self, access: &NoteAccess, content: &str) -> Result<Note> {
        if content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(AppError::Validation(format!(
                "Content exceeds the maximum of {} characters.",
                MAX_CONTENT_LENGTH
            )));
        }

        let note = self.repo.update_note_content(access.note_id(), content).await?;
        tracing::debug!("Saved content of note: {}", note.code);

        Ok(note)
    }

    /// Protect a note that has no PIN yet
    pub async fn set_pin(&self, access: &NoteAccess, pin: &str, confirm: &str) -> Result<Note> {
        let current = self.repo.get_note(access.note_id()).await?;
        if current.has_pin() {
            return Err(AppError::PinAlreadySet);
        }

        check_new_pin(pin, confirm)?;

        let sealed = self.guard.seal_pin(pin)?;
        let note = self.repo.set_note_pin(access.note_id(), Some(&sealed)).await?;
        self.guard.pin_changed(access).await;

        tracing::info!("PIN set for note: {}", note.code);
        Ok(note)
    }

    /// Replace the PIN after checking the current one
    pub async fn update_pin(
        &self,
        access: &NoteAccess,
        current: &str,
        new_pin: &str,
        confirm: &str,
    ) -> Result<Note> {
        if current.is_empty() {
            return Err(AppError::Validation("Current PIN is required.".to_string()));
        }

        if !self.guard.validate_pin(access.note_id(), current).await? {
            return Err(AppError::InvalidPin);
        }

        check_new_pin(new_pin, confirm)?;

        let sealed = self.guard.seal_pin(new_pin)?;
        let note = self.repo.set_note_pin(access.note_id(), Some(&sealed)).await?;
        self.guard.pin_changed(access).await;

        tracing::info!("PIN updated for note: {}", note.code);
        Ok(note)
    }

    /// Remove the PIN after checking the current one
    pub async fn remove_pin(&self, access: &NoteAccess, current: &str) -> Result<Note> {
        if current.is_empty() {
            return Err(AppError::Validation("Current PIN is required.".to_string()));
        }

        if !self.guard.validate_pin(access.note_id(), current).await? {
            return Err(AppError::InvalidPin);
        }

        let note = self.repo.set_note_pin(access.note_id(), None).await?;
        self.guard.pin_cleared(access.code()).await;

        tracing::info!("PIN removed from note: {}", note.code);
        Ok(note)
    }

    pub async fn validate_pin(&self, note_id: &str, pin: &str) -> Result<bool> {
        self.guard.validate_pin(note_id, pin).await
    }

    /// Permanently delete a note and all of its attachments.
    ///
    /// A PIN-protected note needs its PIN again even in a verified session.
    /// Returns false when the note was already gone.
    pub async fn destroy_note(&self, access: NoteAccess, pin: Option<&str>) -> Result<bool> {
        let Some(note) = self.repo.find_note(access.note_id()).await? else {
            return Ok(false);
        };

        if note.has_pin() {
            let pin = pin.unwrap_or_default();
            if pin.is_empty() {
                return Err(AppError::Validation(
                    "PIN is required to delete this note.".to_string(),
                ));
            }
            if !self.guard.validate_pin(&note.id, pin).await? {
                return Err(AppError::InvalidPin);
            }
        }

        tracing::info!("Destroying note: {}", note.code);

        let removed = self.attachments.delete_all_for_note(&note.id).await?;
        let deleted = self.repo.delete_note(&note.id).await?;
        self.guard.pin_cleared(&note.code).await;

        tracing::info!(
            "Note destroyed: {} ({} attachment(s) removed)",
            note.code,
            removed
        );

        Ok(deleted)
    }
}

/// Codes are used verbatim; only emptiness and length are restricted
fn validate_code(code: &str) -> Result<()> {
    if code.trim().is_empty() {
        return Err(AppError::Validation("Access code is required.".to_string()));
    }
    if code.chars().count() > MAX_CODE_LENGTH {
        return Err(AppError::Validation(format!(
            "Access code must be at most {} characters.",
            MAX_CODE_LENGTH
        )));
    }
    Ok(())
}

fn check_new_pin(pin: &str, confirm: &str) -> Result<()> {
    if pin.is_empty() || confirm.is_empty() {
        return Err(AppError::Validation(
            "PIN and confirmation are required.".to_string(),
        ));
    }
    if pin != confirm {
        return Err(AppError::Validation("PINs do not match.".to_string()));
    }

    let length = pin.chars().count();
    if length < MIN_PIN_LENGTH {
        return Err(AppError::Validation(format!(
            "PIN must be at least {} characters long.",
            MIN_PIN_LENGTH
        )));
    }
    if length > MAX_PIN_LENGTH {
        return Err(AppError::Validation(format!(
            "PIN must be at most {} characters long.",
            MAX_PIN_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PinCipher;
    use crate::database::create_memory_pool;
    use crate::services::access::AccessDecision;
    use crate::services::attachments::FileUpload;
    use crate::session::{SessionId, SessionStore};
    use crate::storage::memory::MemoryStorage;
    use crate::validation::FileRules;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        notes: NotesService,
        attachments: AttachmentsService,
        guard: AccessGuard,
        storage: Arc<MemoryStorage>,
        repo: Repository,
    }

    async fn create_test_service() -> Fixture {
        let repo = Repository::new(create_memory_pool().await.unwrap());
        let storage = Arc::new(MemoryStorage::new());
        let attachments = AttachmentsService::new(
            repo.clone(),
            storage.clone(),
            Arc::new(FileRules::standard()),
        );
        let guard = AccessGuard::new(
            repo.clone(),
            PinCipher::new("test-secret").unwrap(),
            SessionStore::new(Duration::from_secs(60)),
        );
        let notes = NotesService::new(repo.clone(), guard.clone(), attachments.clone());

        Fixture {
            notes,
            attachments,
            guard,
            storage,
            repo,
        }
    }

    async fn session(fixture: &Fixture) -> SessionId {
        fixture.guard.sessions().resume(None).await.0
    }

    async fn access(fixture: &Fixture, code: &str, session: &SessionId) -> NoteAccess {
        fixture
            .guard
            .authorize(code, session)
            .await
            .unwrap()
            .into_access()
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_twice_conflicts() {
        let fixture = create_test_service().await;

        let first = fixture.notes.create_note("ABC123").await;
        assert!(first.is_ok());

        let second = fixture.notes.create_note("ABC123").await;
        assert!(matches!(second, Err(AppError::NoteAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_code_validation() {
        let fixture = create_test_service().await;

        assert!(matches!(
            fixture.notes.create_note("   ").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            fixture.notes.create_note(&"x".repeat(MAX_CODE_LENGTH + 1)).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_open_is_get_or_create() {
        let fixture = create_test_service().await;

        let created = fixture.notes.open_note("NEW").await.unwrap();
        let reopened = fixture.notes.open_note("NEW").await.unwrap();
        assert_eq!(created.id, reopened.id);
    }

    #[tokio::test]
    async fn test_save_and_reload_content() {
        let fixture = create_test_service().await;
        fixture.notes.create_note("ABC123").await.unwrap();
        let session = session(&fixture).await;
        let access = access(&fixture, "ABC123", &session).await;

        fixture.notes.save_content(&access, "hello").await.unwrap();

        let reloaded = fixture.notes.get_note_by_code("ABC123").await.unwrap().unwrap();
        assert_eq!(reloaded.content, "hello");
    }

    #[tokio::test]
    async fn test_content_length_limit() {
        let fixture = create_test_service().await;
        fixture.notes.create_note("ABC123").await.unwrap();
        let session = session(&fixture).await;
        let access = access(&fixture, "ABC123", &session).await;

        let at_limit = "é".repeat(MAX_CONTENT_LENGTH);
        assert!(fixture.notes.save_content(&access, &at_limit).await.is_ok());

        let over = "a".repeat(MAX_CONTENT_LENGTH + 1);
        assert!(matches!(
            fixture.notes.save_content(&access, &over).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_set_pin_then_fresh_session_needs_verification() {
        let fixture = create_test_service().await;
        let note = fixture.notes.create_note("ABC123").await.unwrap();
        let owner = session(&fixture).await;
        let access = access(&fixture, "ABC123", &owner).await;

        fixture.notes.set_pin(&access, "1234", "1234").await.unwrap();

        assert!(fixture.notes.validate_pin(&note.id, "1234").await.unwrap());
        assert!(!fixture.notes.validate_pin(&note.id, "4321").await.unwrap());

        // The session that set the PIN stays verified
        assert!(fixture.guard.authorize("ABC123", &owner).await.unwrap().is_granted());

        let fresh = session(&fixture).await;
        let decision = fixture.guard.authorize("ABC123", &fresh).await.unwrap();
        assert!(matches!(decision, AccessDecision::NeedsVerification { .. }));
    }

    #[tokio::test]
    async fn test_set_pin_rules() {
        let fixture = create_test_service().await;
        fixture.notes.create_note("ABC123").await.unwrap();
        let session = session(&fixture).await;
        let access = access(&fixture, "ABC123", &session).await;

        for (pin, confirm) in [("", ""), ("1234", ""), ("1234", "1235"), ("123", "123")] {
            assert!(matches!(
                fixture.notes.set_pin(&access, pin, confirm).await,
                Err(AppError::Validation(_))
            ));
        }

        fixture.notes.set_pin(&access, "1234", "1234").await.unwrap();
        assert!(matches!(
            fixture.notes.set_pin(&access, "5678", "5678").await,
            Err(AppError::PinAlreadySet)
        ));
    }

    #[tokio::test]
    async fn test_update_pin_revokes_other_sessions() {
        let fixture = create_test_service().await;
        let note = fixture.notes.create_note("ABC123").await.unwrap();
        let owner = session(&fixture).await;
        let access = access(&fixture, "ABC123", &owner).await;
        fixture.notes.set_pin(&access, "1234", "1234").await.unwrap();

        let other = session(&fixture).await;
        fixture.guard.verify_pin("ABC123", &other, "1234").await.unwrap();

        assert!(matches!(
            fixture.notes.update_pin(&access, "0000", "5678", "5678").await,
            Err(AppError::InvalidPin)
        ));

        fixture
            .notes
            .update_pin(&access, "1234", "5678", "5678")
            .await
            .unwrap();

        assert!(fixture.notes.validate_pin(&note.id, "5678").await.unwrap());
        assert!(!fixture.notes.validate_pin(&note.id, "1234").await.unwrap());
        assert!(fixture.guard.authorize("ABC123", &owner).await.unwrap().is_granted());
        assert!(!fixture.guard.authorize("ABC123", &other).await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn test_remove_pin() {
        let fixture = create_test_service().await;
        let note = fixture.notes.create_note("ABC123").await.unwrap();
        let owner = session(&fixture).await;
        let access = access(&fixture, "ABC123", &owner).await;
        fixture.notes.set_pin(&access, "1234", "1234").await.unwrap();

        assert!(matches!(
            fixture.notes.remove_pin(&access, "9999").await,
            Err(AppError::InvalidPin)
        ));

        let unlocked = fixture.notes.remove_pin(&access, "1234").await.unwrap();
        assert!(!unlocked.has_pin());
        assert!(fixture.notes.validate_pin(&note.id, "anything").await.unwrap());

        let fresh = session(&fixture).await;
        assert!(fixture.guard.authorize("ABC123", &fresh).await.unwrap().is_granted());
    }

    #[tokio::test]
    async fn test_destroy_requires_pin() {
        let fixture = create_test_service().await;
        fixture.notes.create_note("ABC123").await.unwrap();
        let owner = session(&fixture).await;
        let access = access(&fixture, "ABC123", &owner).await;
        fixture.notes.set_pin(&access, "1234", "1234").await.unwrap();

        assert!(matches!(
            fixture.notes.destroy_note(access.clone(), None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            fixture.notes.destroy_note(access.clone(), Some("0000")).await,
            Err(AppError::InvalidPin)
        ));

        assert!(fixture.notes.destroy_note(access, Some("1234")).await.unwrap());
        assert!(fixture.notes.get_note_by_code("ABC123").await.unwrap().is_none());
        assert!(!fixture.guard.sessions().is_verified(&owner, "ABC123").await);
    }

    #[tokio::test]
    async fn test_destroy_cascades_despite_remote_failure() {
        let fixture = create_test_service().await;
        let note = fixture.notes.create_note("ABC123").await.unwrap();
        let session = session(&fixture).await;
        let access = access(&fixture, "ABC123", &session).await;

        let mut object_ids = Vec::new();
        for (name, mime) in [
            ("a.pdf", "application/pdf"),
            ("b.png", "image/png"),
            ("c.zip", "application/zip"),
        ] {
            let attachment = fixture
                .attachments
                .upload(
                    &access,
                    FileUpload {
                        file_name: name.to_string(),
                        content_type: mime.to_string(),
                        declared_category: None,
                        data: b"bytes".to_vec(),
                    },
                )
                .await
                .unwrap();
            object_ids.push(attachment.remote_object_id);
        }
        fixture.storage.fail_delete_of(&object_ids[1]);

        assert!(fixture.notes.destroy_note(access, None).await.unwrap());

        assert!(fixture
            .repo
            .list_attachments(&note.id, None)
            .await
            .unwrap()
            .is_empty());
        assert!(fixture.repo.find_note(&note.id).await.unwrap().is_none());
        assert_eq!(fixture.storage.deleted().len(), 2);
        assert_eq!(fixture.storage.swept_folders(), vec![note.id.clone()]);
    }
}
