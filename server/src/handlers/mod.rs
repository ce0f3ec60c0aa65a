//! HTTP handlers
//!
//! JSON API under `/api`. Every request runs through the session middleware,
//! which resumes or starts a session and makes its [`SessionId`] available
//! as a request extension.

pub mod attachments;
pub mod notes;
pub mod pin;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::app::AppState;
use crate::config::SESSION_COOKIE_NAME;
use crate::database::Note;
use crate::error::{AppError, Result};
use crate::services::NoteAccess;
use crate::session::SessionId;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Note as returned to clients. The PIN never leaves the server.
#[derive(Debug, Serialize)]
pub struct NoteView {
    pub code: String,
    pub content: String,
    pub has_pin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Note> for NoteView {
    fn from(note: &Note) -> Self {
        Self {
            code: note.code.clone(),
            content: note.content.clone(),
            has_pin: note.has_pin(),
            created_at: note.created_at,
            updated_at: note.updated_at,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.max_upload_size + MULTIPART_OVERHEAD_BYTES)
        .unwrap_or(usize::MAX);

    let mut router = Router::new()
        .route("/api/health", get(health))
        .route("/api/session/logout", post(logout))
        .route("/api/notes", post(notes::create_note))
        .route("/api/notes/open", post(notes::open_note))
        .route("/api/notes/{code}", get(notes::get_note))
        .route("/api/notes/{code}/content", axum::routing::put(notes::save_content))
        .route("/api/notes/{code}/destroy", post(notes::destroy_note))
        .route("/api/notes/{code}/verify", post(pin::verify_pin))
        .route("/api/notes/{code}/pin", post(pin::set_pin).put(pin::update_pin))
        .route("/api/notes/{code}/pin/remove", post(pin::remove_pin))
        .route(
            "/api/notes/{code}/files",
            post(attachments::upload)
                .layer(DefaultBodyLimit::max(upload_limit))
                .get(attachments::list),
        )
        .route(
            "/api/notes/{code}/files/{id}",
            get(attachments::download).delete(attachments::delete),
        );

    if let Some(root) = &state.local_files {
        router = router.nest_service("/files", ServeDir::new(root));
    }

    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Resume the caller's session or start one, issuing the cookie when new
async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let token = jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string());
    let (session, is_new) = state.sessions.resume(token.as_deref()).await;

    request.extensions_mut().insert(session.clone());
    let response = next.run(request).await;

    if !is_new {
        return response;
    }

    let cookie = Cookie::build((SESSION_COOKIE_NAME, session.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .build();

    (jar.add(cookie), response).into_response()
}

/// Resolve the note for a code, requiring PIN verification where needed
pub(crate) async fn authorize(state: &AppState, code: &str, session: &SessionId) -> Result<NoteAccess> {
    state.access.authorize(code, session).await?.into_access()
}

/// Like [`authorize`], but a PIN sent with the request grants access on its own
pub(crate) async fn authorize_pin(
    state: &AppState,
    code: &str,
    session: &SessionId,
    pin: Option<&str>,
) -> Result<NoteAccess> {
    match pin.map(str::trim).filter(|p| !p.is_empty()) {
        Some(pin) => state.access.authorize_with_pin(code, session, pin).await,
        None => authorize(state, code, session).await,
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "status": "ok" }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    jar: CookieJar,
) -> std::result::Result<impl IntoResponse, AppError> {
    state.sessions.end(&session).await;
    tracing::debug!("Session ended");

    let jar = jar.remove(Cookie::build(SESSION_COOKIE_NAME).path("/"));
    Ok((jar, Json(json!({ "success": true }))))
}
