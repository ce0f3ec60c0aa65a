//! Note access control
//!
//! [`AccessGuard`] is the only place that decides whether a session may act
//! on a note. A successful decision yields a [`NoteAccess`] token, and every
//! note, PIN and attachment operation takes one, so no call site can skip the
//! check.

use crate::crypto::PinCipher;
use crate::database::{Note, Repository};
use crate::error::{AppError, Result};
use crate::session::{SessionId, SessionStore};

/// Proof that a session was authorized for a note.
///
/// Only [`AccessGuard`] can construct one. Holds the note as it was when
/// access was granted.
#[derive(Debug, Clone)]
pub struct NoteAccess {
    note: Note,
    session: SessionId,
}

impl NoteAccess {
    pub(crate) fn new(note: Note, session: SessionId) -> Self {
        Self { note, session }
    }

    pub fn note(&self) -> &Note {
        &self.note
    }

    pub fn note_id(&self) -> &str {
        &self.note.id
    }

    pub fn code(&self) -> &str {
        &self.note.code
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn into_note(self) -> Note {
        self.note
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    EmptyCode,
    NoteNotFound { code: String },
}

/// Outcome of an authorization check
#[derive(Debug)]
pub enum AccessDecision {
    Granted(NoteAccess),
    /// The note has a PIN this session has not verified yet
    NeedsVerification { code: String },
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }

    /// Turn anything but a grant into the matching error
    pub fn into_access(self) -> Result<NoteAccess> {
        match self {
            AccessDecision::Granted(access) => Ok(access),
            AccessDecision::NeedsVerification { code } => {
                Err(AppError::PinVerificationRequired(code))
            }
            AccessDecision::Denied(DenyReason::EmptyCode) => {
                Err(AppError::AccessDenied("Access code is required".to_string()))
            }
            AccessDecision::Denied(DenyReason::NoteNotFound { code }) => {
                Err(AppError::NoteNotFound(code))
            }
        }
    }
}

/// Resolves notes by code and enforces PIN verification per session
#[derive(Clone)]
pub struct AccessGuard {
    repo: Repository,
    pins: PinCipher,
    sessions: SessionStore,
}

impl AccessGuard {
    pub fn new(repo: Repository, pins: PinCipher, sessions: SessionStore) -> Self {
        Self {
            repo,
            pins,
            sessions,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub async fn authorize(&self, code: &str, session: &SessionId) -> Result<AccessDecision> {
        if code.trim().is_empty() {
            return Ok(AccessDecision::Denied(DenyReason::EmptyCode));
        }

        let Some(note) = self.repo.find_note_by_code(code).await? else {
            return Ok(AccessDecision::Denied(DenyReason::NoteNotFound {
                code: code.to_string(),
            }));
        };

        if !note.has_pin() || self.sessions.is_verified(session, &note.code).await {
            return Ok(AccessDecision::Granted(NoteAccess::new(note, session.clone())));
        }

        Ok(AccessDecision::NeedsVerification {
            code: note.code,
        })
    }

    /// Check a PIN for this session. On success the session stays verified
    /// for the note until the PIN changes or the session expires.
    pub async fn verify_pin(&self, code: &str, session: &SessionId, pin: &str) -> Result<NoteAccess> {
        let note = match self.authorize(code, session).await? {
            AccessDecision::Granted(access) if !access.note().has_pin() => return Ok(access),
            AccessDecision::Granted(access) => access.into_note(),
            AccessDecision::NeedsVerification { .. } => self
                .repo
                .find_note_by_code(code)
                .await?
                .ok_or_else(|| AppError::NoteNotFound(code.to_string()))?,
            denied => return denied.into_access(),
        };

        if !self.check_pin(&note, pin) {
            tracing::info!("PIN verification failed for note: {}", note.code);
            return Err(AppError::InvalidPin);
        }

        self.sessions.mark_verified(session, &note.code).await;
        tracing::info!("PIN verified for note: {}", note.code);

        Ok(NoteAccess::new(note, session.clone()))
    }

    /// Grant access for one request on the strength of a PIN.
    ///
    /// Unlike [`verify_pin`](Self::verify_pin) the session is left untouched,
    /// so the next request without a PIN is checked as usual.
    pub async fn authorize_with_pin(
        &self,
        code: &str,
        session: &SessionId,
        pin: &str,
    ) -> Result<NoteAccess> {
        let note = match self.authorize(code, session).await? {
            AccessDecision::Granted(access) if !access.note().has_pin() => return Ok(access),
            AccessDecision::Granted(access) => access.into_note(),
            AccessDecision::NeedsVerification { .. } => self
                .repo
                .find_note_by_code(code)
                .await?
                .ok_or_else(|| AppError::NoteNotFound(code.to_string()))?,
            denied => return denied.into_access(),
        };

        if !self.check_pin(&note, pin) {
            tracing::info!("PIN rejected for note: {}", note.code);
            return Err(AppError::InvalidPin);
        }

        Ok(NoteAccess::new(note, session.clone()))
    }

    /// Validate a PIN candidate against the stored one.
    ///
    /// Missing notes and undecryptable PINs validate as false, notes without
    /// a PIN as true.
    pub async fn validate_pin(&self, note_id: &str, pin: &str) -> Result<bool> {
        match self.repo.find_note(note_id).await? {
            Some(note) => Ok(self.check_pin(&note, pin)),
            None => Ok(false),
        }
    }

    pub(crate) fn check_pin(&self, note: &Note, candidate: &str) -> bool {
        let Some(sealed) = note.pin.as_deref().filter(|p| !p.is_empty()) else {
            return true;
        };

        if candidate.is_empty() {
            return false;
        }

        match self.pins.open(sealed) {
            Ok(stored) => stored == candidate,
            Err(e) => {
                tracing::warn!("Could not decrypt PIN of note {}: {}", note.code, e);
                false
            }
        }
    }

    /// Encrypt a PIN for storage
    pub(crate) fn seal_pin(&self, pin: &str) -> Result<String> {
        self.pins.seal(pin)
    }

    /// A PIN was set or changed: every other session must verify again
    pub(crate) async fn pin_changed(&self, access: &NoteAccess) {
        self.sessions.revoke_code(access.code()).await;
        self.sessions.mark_verified(access.session(), access.code()).await;
    }

    /// A PIN was removed or the note destroyed
    pub(crate) async fn pin_cleared(&self, code: &str) {
        self.sessions.revoke_code(code).await;
    }
}
