//! Services module
//!
//! Business logic services that coordinate between the HTTP handlers,
//! the repository and object storage.

pub mod access;
pub mod attachments;
pub mod notes;

pub use access::{AccessDecision, AccessGuard, DenyReason, NoteAccess};
pub use attachments::{AttachmentsService, FileUpload};
pub use notes::NotesService;
