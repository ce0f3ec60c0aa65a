//! Note handlers: create, open, read, save, destroy

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use super::{authorize, NoteView};
use crate::app::AppState;
use crate::error::{AppError, Result};
use crate::services::AccessDecision;
use crate::session::SessionId;

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveContentRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DestroyRequest {
    #[serde(default)]
    pub pin: Option<String>,
}

pub async fn create_note(
    State(state): State<AppState>,
    Json(req): Json<CodeRequest>,
) -> Result<impl IntoResponse> {
    let note = state.notes.create_note(&req.code).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "note": NoteView::from(&note) })),
    ))
}

/// Landing-page flow: get or create the note, then report whether the
/// session may read it or has to enter the PIN first
pub async fn open_note(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Json(req): Json<CodeRequest>,
) -> Result<impl IntoResponse> {
    let note = state.notes.open_note(&req.code).await?;

    let body = match state.access.authorize(&note.code, &session).await? {
        AccessDecision::Granted(access) => json!({
            "success": true,
            "status": "granted",
            "note": NoteView::from(access.note()),
        }),
        AccessDecision::NeedsVerification { code } => json!({
            "success": true,
            "status": "needs_verification",
            "needs_pin_verification": true,
            "code": code,
        }),
        denied => return denied.into_access().map(|_| Json(json!({}))),
    };

    Ok(Json(body))
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse> {
    let access = authorize(&state, &code, &session).await?;

    Ok(Json(json!({ "success": true, "note": NoteView::from(access.note()) })))
}

pub async fn save_content(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    Json(req): Json<SaveContentRequest>,
) -> Result<impl IntoResponse> {
    let access = authorize(&state, &code, &session).await?;
    let note = state.notes.save_content(&access, &req.content).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Note saved successfully!",
        "note": NoteView::from(&note),
    })))
}

pub async fn destroy_note(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let access = authorize(&state, &code, &session).await?;

    // The body is optional for notes without a PIN
    let req: DestroyRequest = if body.iter().all(u8::is_ascii_whitespace) {
        DestroyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))?
    };

    if !state.notes.destroy_note(access, req.pin.as_deref()).await? {
        return Err(AppError::NoteNotFound(code));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Note and all files deleted successfully.",
    })))
}
