//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the chat and lesson REST API and the OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AlertView, CategoriesView, ChatSessionView, CustomLessonPayload, Direction, ErrorResponse,
        LessonSessionView, LessonState, LineView, SelectCategoryPayload, SubmitMessagePayload,
        TurnSender, TurnView,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::list_categories,
        handlers::create_chat,
        handlers::get_chat,
        handlers::submit_message,
        handlers::reset_chat,
        handlers::close_chat,
        handlers::create_lesson,
        handlers::get_lesson,
        handlers::select_category,
        handlers::fetch_advanced,
        handlers::add_custom_lesson,
        handlers::close_lesson,
    ),
    components(
        schemas(
            CategoriesView, ChatSessionView, TurnView, TurnSender, Direction,
            LessonSessionView, LessonState, LineView, AlertView,
            SubmitMessagePayload, SelectCategoryPayload, CustomLessonPayload, ErrorResponse
        )
    ),
    tags(
        (name = "Aima API", description = "Conversation practice and lessons for the Aima English tutor")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/categories", get(handlers::list_categories))
        .route("/chat/sessions", post(handlers::create_chat))
        .route(
            "/chat/sessions/{id}",
            get(handlers::get_chat).delete(handlers::close_chat),
        )
        .route(
            "/chat/sessions/{id}/messages",
            post(handlers::submit_message),
        )
        .route("/chat/sessions/{id}/reset", post(handlers::reset_chat))
        .route("/lessons/sessions", post(handlers::create_lesson))
        .route(
            "/lessons/sessions/{id}",
            get(handlers::get_lesson).delete(handlers::close_lesson),
        )
        .route(
            "/lessons/sessions/{id}/category",
            put(handlers::select_category),
        )
        .route(
            "/lessons/sessions/{id}/advanced",
            post(handlers::fetch_advanced),
        )
        .route(
            "/lessons/sessions/{id}/custom",
            post(handlers::add_custom_lesson),
        )
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
