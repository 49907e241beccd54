//! Axum Handlers for the REST API
//!
//! Each handler locks a session only to dispatch or settle a request. The
//! completion itself runs in a spawned task outside the lock, so a reset or
//! close can cancel it, and a dropped HTTP request still settles the session.

use aima_core::{
    Category, CategoryKey, Completion, CompletionError, ConversationSession,
    lesson::{LessonTicket, PendingLesson, Selection},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    models::{
        CategoriesView, ChatSessionView, CustomLessonPayload, ErrorResponse, LessonSessionView,
        SelectCategoryPayload, SubmitMessagePayload,
    },
    state::{AppState, LessonEntry, LessonHandle},
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn chat_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Chat session with id '{}' not found", id))
}

fn lesson_not_found(id: Uuid) -> ApiError {
    ApiError::NotFound(format!("Lesson session with id '{}' not found", id))
}

/// List the built-in lesson categories.
#[utoipa::path(
    get,
    path = "/categories",
    responses(
        (status = 200, description = "Built-in lesson categories", body = CategoriesView)
    )
)]
pub async fn list_categories() -> Json<CategoriesView> {
    Json(CategoriesView {
        categories: Category::ALL
            .iter()
            .map(|c| c.label().to_string())
            .collect(),
    })
}

// --- Chat ---

/// Start a new chat session seeded with the greeting.
#[utoipa::path(
    post,
    path = "/chat/sessions",
    responses(
        (status = 201, description = "Chat session created", body = ChatSessionView)
    )
)]
pub async fn create_chat(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let id = Uuid::new_v4();
    let session = ConversationSession::new(state.prompts.clone());
    let view = ChatSessionView::new(id, &session);
    state.insert_chat(id, session).await;
    info!(session_id = %id, "Chat session created");
    (StatusCode::CREATED, Json(view))
}

/// Get the current state of a chat session.
#[utoipa::path(
    get,
    path = "/chat/sessions/{id}",
    responses(
        (status = 200, description = "Chat session", body = ChatSessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Chat session ID"))
)]
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatSessionView>, ApiError> {
    let handle = state.chat(id).await.ok_or_else(|| chat_not_found(id))?;
    let session = handle.lock().await;
    Ok(Json(ChatSessionView::new(id, &session)))
}

/// Submit a message and wait for the tutor's reply.
///
/// Blank messages are ignored and the unchanged session is returned.
#[utoipa::path(
    post,
    path = "/chat/sessions/{id}/messages",
    request_body = SubmitMessagePayload,
    responses(
        (status = 200, description = "Session after the reply settled", body = ChatSessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Chat session ID"))
)]
#[instrument(skip_all, fields(session_id = %id))]
pub async fn submit_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitMessagePayload>,
) -> Result<Json<ChatSessionView>, ApiError> {
    let handle = state.chat(id).await.ok_or_else(|| chat_not_found(id))?;

    let pending = handle.lock().await.begin_submit(&payload.text);
    if let Some(pending) = pending {
        let client = state.client.clone();
        let session = handle.clone();
        tokio::spawn(async move {
            let outcome = client.complete(pending.request, pending.cancel).await;
            session.lock().await.finish_submit(pending.ticket, outcome);
        })
        .await?;
    }

    let session = handle.lock().await;
    Ok(Json(ChatSessionView::new(id, &session)))
}

/// Reset a chat session to the greeting, cancelling any pending reply.
#[utoipa::path(
    post,
    path = "/chat/sessions/{id}/reset",
    responses(
        (status = 200, description = "Session after reset", body = ChatSessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Chat session ID"))
)]
pub async fn reset_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChatSessionView>, ApiError> {
    let handle = state.chat(id).await.ok_or_else(|| chat_not_found(id))?;
    let mut session = handle.lock().await;
    session.reset();
    Ok(Json(ChatSessionView::new(id, &session)))
}

/// End a chat session, cancelling any pending reply.
#[utoipa::path(
    delete,
    path = "/chat/sessions/{id}",
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Chat session ID"))
)]
pub async fn close_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let handle = state
        .remove_chat(id)
        .await
        .ok_or_else(|| chat_not_found(id))?;
    handle.lock().await.close();
    info!(session_id = %id, "Chat session closed");
    Ok(StatusCode::NO_CONTENT)
}

// --- Lessons ---

/// Start a new lesson session with an empty cache.
#[utoipa::path(
    post,
    path = "/lessons/sessions",
    responses(
        (status = 201, description = "Lesson session created", body = LessonSessionView)
    )
)]
pub async fn create_lesson(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let id = Uuid::new_v4();
    let entry = LessonEntry::new(state.prompts.clone());
    let view = LessonSessionView::new(id, &entry.session, Vec::new());
    state.insert_lesson(id, entry).await;
    info!(session_id = %id, "Lesson session created");
    (StatusCode::CREATED, Json(view))
}

/// Get the current state of a lesson session.
#[utoipa::path(
    get,
    path = "/lessons/sessions/{id}",
    responses(
        (status = 200, description = "Lesson session", body = LessonSessionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Lesson session ID"))
)]
pub async fn get_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<LessonSessionView>, ApiError> {
    let handle = state.lesson(id).await.ok_or_else(|| lesson_not_found(id))?;
    Ok(Json(lesson_view(id, &handle).await))
}

/// Select a category, served from cache when already fetched.
#[utoipa::path(
    put,
    path = "/lessons/sessions/{id}/category",
    request_body = SelectCategoryPayload,
    responses(
        (status = 200, description = "Session after the lesson settled", body = LessonSessionView),
        (status = 400, description = "Blank category", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Lesson session ID"))
)]
#[instrument(skip_all, fields(session_id = %id, category = %payload.category))]
pub async fn select_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectCategoryPayload>,
) -> Result<Json<LessonSessionView>, ApiError> {
    let handle = state.lesson(id).await.ok_or_else(|| lesson_not_found(id))?;

    let selection = handle
        .lock()
        .await
        .session
        .begin_select(CategoryKey::new(payload.category))
        .map_err(|e| ApiError::BadRequest(format!("Invalid category: {}", e)))?;
    if let Selection::Fetch(pending) = selection {
        run_lesson_fetch(&state, &handle, pending).await?;
    }

    Ok(Json(lesson_view(id, &handle).await))
}

/// Fetch the advanced lesson for a category. Never cached.
#[utoipa::path(
    post,
    path = "/lessons/sessions/{id}/advanced",
    request_body = SelectCategoryPayload,
    responses(
        (status = 200, description = "Session after the lesson settled", body = LessonSessionView),
        (status = 400, description = "Blank category", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Lesson session ID"))
)]
#[instrument(skip_all, fields(session_id = %id, category = %payload.category))]
pub async fn fetch_advanced(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SelectCategoryPayload>,
) -> Result<Json<LessonSessionView>, ApiError> {
    let handle = state.lesson(id).await.ok_or_else(|| lesson_not_found(id))?;

    let pending = handle
        .lock()
        .await
        .session
        .begin_advanced(CategoryKey::new(payload.category))
        .map_err(|e| ApiError::BadRequest(format!("Invalid category: {}", e)))?;
    run_lesson_fetch(&state, &handle, pending).await?;

    Ok(Json(lesson_view(id, &handle).await))
}

/// Add a user-authored lesson in front of the displayed lines.
#[utoipa::path(
    post,
    path = "/lessons/sessions/{id}/custom",
    request_body = CustomLessonPayload,
    responses(
        (status = 200, description = "Session with the custom lesson", body = LessonSessionView),
        (status = 400, description = "Blank lesson body", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Lesson session ID"))
)]
pub async fn add_custom_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CustomLessonPayload>,
) -> Result<Json<LessonSessionView>, ApiError> {
    let handle = state.lesson(id).await.ok_or_else(|| lesson_not_found(id))?;
    let mut entry = handle.lock().await;
    if entry
        .session
        .add_custom_lesson(&payload.title, &payload.body)
        .is_err()
    {
        // The rejection alert is the error message; don't report it twice.
        let message = entry
            .drain_alerts()
            .pop()
            .map(|alert| alert.message)
            .unwrap_or_else(|| "Lesson body is empty".to_string());
        return Err(ApiError::BadRequest(message));
    }
    let alerts = entry.drain_alerts();
    Ok(Json(LessonSessionView::new(id, &entry.session, alerts)))
}

/// End a lesson session, cancelling any fetch in flight.
#[utoipa::path(
    delete,
    path = "/lessons/sessions/{id}",
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Lesson session ID"))
)]
pub async fn close_lesson(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let handle = state
        .remove_lesson(id)
        .await
        .ok_or_else(|| lesson_not_found(id))?;
    handle.lock().await.session.close();
    info!(session_id = %id, "Lesson session closed");
    Ok(StatusCode::NO_CONTENT)
}

/// Runs a dispatched lesson fetch to completion outside the session lock.
async fn run_lesson_fetch(
    state: &Arc<AppState>,
    handle: &LessonHandle,
    pending: PendingLesson,
) -> Result<(), ApiError> {
    let client = state.client.clone();
    let session = handle.clone();
    let PendingLesson {
        ticket,
        request,
        cancel,
    } = pending;
    tokio::spawn(async move {
        let outcome = client.complete(request, cancel).await;
        settle_lesson(&session, ticket, outcome).await;
    })
    .await?;
    Ok(())
}

async fn settle_lesson(
    handle: &LessonHandle,
    ticket: LessonTicket,
    outcome: Result<Completion, CompletionError>,
) {
    handle.lock().await.session.finish_fetch(ticket, outcome);
}

async fn lesson_view(id: Uuid, handle: &LessonHandle) -> LessonSessionView {
    let mut entry = handle.lock().await;
    let alerts = entry.drain_alerts();
    LessonSessionView::new(id, &entry.session, alerts)
}
