//! PIN handlers: verify for this session, set, update, remove

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use super::{authorize, NoteView};
use crate::app::AppState;
use crate::error::Result;
use crate::session::SessionId;

#[derive(Debug, Deserialize)]
pub struct VerifyPinRequest {
    pub pin: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPinRequest {
    pub pin: String,
    #[serde(default)]
    pub confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePinRequest {
    pub current: String,
    #[serde(rename = "new", alias = "new_pin")]
    pub new_pin: String,
    #[serde(default)]
    pub confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct RemovePinRequest {
    pub current: String,
}

pub async fn verify_pin(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    Json(req): Json<VerifyPinRequest>,
) -> Result<impl IntoResponse> {
    let access = state.access.verify_pin(&code, &session, &req.pin).await?;

    Ok(Json(json!({ "success": true, "note": NoteView::from(access.note()) })))
}

pub async fn set_pin(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    Json(req): Json<SetPinRequest>,
) -> Result<impl IntoResponse> {
    let access = authorize(&state, &code, &session).await?;
    let note = state.notes.set_pin(&access, &req.pin, &req.confirm).await?;

    Ok(Json(json!({
        "success": true,
        "message": "PIN set successfully!",
        "note": NoteView::from(&note),
    })))
}

pub async fn update_pin(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    Json(req): Json<UpdatePinRequest>,
) -> Result<impl IntoResponse> {
    let access = authorize(&state, &code, &session).await?;
    let note = state
        .notes
        .update_pin(&access, &req.current, &req.new_pin, &req.confirm)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "PIN updated successfully!",
        "note": NoteView::from(&note),
    })))
}

pub async fn remove_pin(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    Json(req): Json<RemovePinRequest>,
) -> Result<impl IntoResponse> {
    let access = authorize(&state, &code, &session).await?;
    let note = state.notes.remove_pin(&access, &req.current).await?;

    Ok(Json(json!({
        "success": true,
        "message": "PIN removed successfully!",
        "note": NoteView::from(&note),
    })))
}
