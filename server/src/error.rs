//! Error types for CodeSafe
//!
//! All errors use thiserror for structured error handling.
//! These errors are serialized to HTTP clients as `{"success": false, "error": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::storage::StorageError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    File(#[from] ValidationError),

    #[error("Note not found: {0}")]
    NoteNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Note with code '{0}' already exists")]
    NoteAlreadyExists(String),

    #[error("PIN verification required for note: {0}")]
    PinVerificationRequired(String),

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("A PIN is already set for this note")]
    PinAlreadySet,

    #[error("Attachment not found: {0}")]
    AttachmentNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Metadata insert failed after upload; the remote object was deleted again.
    #[error("Failed to save file metadata (uploaded object {object_id} was rolled back): {source}")]
    UploadRolledBack {
        object_id: String,
        #[source]
        source: Box<AppError>,
    },

    /// Metadata insert failed and the compensating delete failed too.
    /// The remote object is orphaned and must be reconciled out-of-band.
    #[error("Failed to save file metadata and to roll back uploaded object {object_id}: {source}")]
    UploadOrphaned {
        object_id: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::File(_) | AppError::AccessDenied(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NoteNotFound(_) | AppError::AttachmentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::NoteAlreadyExists(_) | AppError::PinAlreadySet => StatusCode::CONFLICT,
            AppError::PinVerificationRequired(_) => StatusCode::FORBIDDEN,
            AppError::InvalidPin => StatusCode::UNAUTHORIZED,
            AppError::Storage(StorageError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(StorageError::Upload(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the failure was a remote-storage timeout, at any depth.
    pub fn is_timeout(&self) -> bool {
        match self {
            AppError::Storage(err) => err.is_timeout(),
            AppError::UploadRolledBack { source, .. } | AppError::UploadOrphaned { source, .. } => {
                source.is_timeout()
            }
            _ => false,
        }
    }

    /// Message shown to HTTP clients. Internal failures are not echoed back.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Storage(StorageError::Timeout(_)) => {
                "Upload timeout - please try with a smaller file or check your internet connection."
                    .to_string()
            }
            AppError::Storage(StorageError::Upload(_)) => {
                "Failed to upload to cloud storage. Please try again later.".to_string()
            }
            AppError::UploadRolledBack { .. } | AppError::UploadOrphaned { .. } => {
                "Failed to save the uploaded file. Please try again.".to_string()
            }
            AppError::Database(_)
            | AppError::Io(_)
            | AppError::Serialization(_)
            | AppError::Crypto(_)
            | AppError::Storage(StorageError::Config(_))
            | AppError::Generic(_) => "An internal error occurred.".to_string(),
            other => other.to_string(),
        }
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let mut body = serde_json::json!({
            "success": false,
            "error": self.user_message(),
        });

        if let AppError::PinVerificationRequired(code) = &self {
            body["needs_pin_verification"] = serde_json::Value::Bool(true);
            body["code"] = serde_json::Value::String(code.clone());
        }

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_distinguishable() {
        let timeout = AppError::from(StorageError::Timeout("slow".into()));
        let generic = AppError::from(StorageError::Upload("boom".into()));

        assert!(timeout.is_timeout());
        assert!(!generic.is_timeout());
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(generic.status_code(), StatusCode::BAD_GATEWAY);
        assert_ne!(timeout.user_message(), generic.user_message());
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = AppError::Crypto("key schedule exploded".into());
        assert!(!err.user_message().contains("key schedule"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rollback_keeps_original_error() {
        let err = AppError::UploadRolledBack {
            object_id: "codesafe/abc/image/1_cat".into(),
            source: Box::new(AppError::Generic("insert failed".into())),
        };

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("insert failed"));
    }

    #[test]
    fn test_serializes_as_message() {
        let err = AppError::NoteNotFound("ABC123".into());
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::Value::String(err.to_string())
        );
    }
}
