//! Attachment handlers: multipart upload, list, download redirect, delete

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect};
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;

use super::authorize_pin;
use crate::app::AppState;
use crate::error::{AppError, Result};
use crate::services::FileUpload;
use crate::session::SessionId;
use crate::validation::{format_file_size, Category};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub pin: Option<String>,
}

/// A PIN sent with the request stands in for session verification
#[derive(Debug, Default, Deserialize)]
pub struct PinQuery {
    pub pin: Option<String>,
}

/// "all" and blank mean no filter
fn parse_category(value: Option<&str>) -> Result<Option<Category>> {
    match value.map(str::trim) {
        None | Some("") | Some("all") => Ok(None),
        Some(value) => Ok(Some(value.parse::<Category>()?)),
    }
}

fn multipart_error(state: &AppState, e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::Validation(format!(
            "File size exceeds maximum allowed size of {}.",
            format_file_size(state.max_upload_size)
        ))
    } else {
        AppError::Validation(format!("Multipart error: {}", e))
    }
}

pub async fn upload(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    Query(query): Query<PinQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut category: Option<String> = None;
    let mut pin = query.pin;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&state, e))?
    {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(&state, e))?
                    .to_vec();
                file = Some((file_name, content_type, data));
            }
            Some("category") | Some("fileType") => {
                category = Some(field.text().await.map_err(|e| multipart_error(&state, e))?);
            }
            Some("pin") => {
                pin = Some(field.text().await.map_err(|e| multipart_error(&state, e))?);
            }
            _ => {} // ignore unknown fields
        }
    }

    let access = authorize_pin(&state, &code, &session, pin.as_deref()).await?;

    let (file_name, content_type, data) =
        file.ok_or_else(|| AppError::Validation("Please select a file.".to_string()))?;

    let upload = FileUpload {
        file_name,
        content_type,
        declared_category: parse_category(category.as_deref())?,
        data,
    };

    let attachment = state.attachments.upload(&access, upload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "File uploaded successfully!",
            "size": format_file_size(attachment.size_bytes.max(0) as u64),
            "attachment": attachment,
        })),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path(code): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse> {
    let access = authorize_pin(&state, &code, &session, query.pin.as_deref()).await?;
    let category = parse_category(query.category.as_deref())?;

    let attachments = state.attachments.list_attachments(&access, category).await?;

    Ok(Json(json!({ "success": true, "attachments": attachments })))
}

pub async fn download(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path((code, id)): Path<(String, String)>,
    Query(query): Query<PinQuery>,
) -> Result<impl IntoResponse> {
    let access = authorize_pin(&state, &code, &session, query.pin.as_deref()).await?;
    let attachment = state.attachments.get_attachment(&access, &id).await?;

    Ok(Redirect::temporary(&attachment.remote_url))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    Path((code, id)): Path<(String, String)>,
    Query(query): Query<PinQuery>,
) -> Result<impl IntoResponse> {
    let access = authorize_pin(&state, &code, &session, query.pin.as_deref()).await?;

    if !state.attachments.delete_attachment(&access, &id).await? {
        return Err(AppError::AttachmentNotFound(id));
    }

    Ok(Json(json!({ "success": true, "message": "File deleted successfully." })))
}
