//! REST API surface.
//!
//! Routes are grouped the way consumers use them: `/sessions` for lifecycle,
//! `/chats` for direct messaging, `/groups` for group messaging and
//! metadata. Session-scoped routes under `/chats` and `/groups` pick their
//! session with an `?id=` query parameter.

pub mod groups;
pub mod messages;
pub mod sessions;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rmsg_session_core::SessionManager;

use crate::response::respond;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

/// Session selector used by `/chats` and `/groups` routes.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub id: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/sessions", sessions::routes())
        .nest("/chats", messages::routes())
        .nest("/groups", groups::routes())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn not_found() -> Response {
    respond(StatusCode::NOT_FOUND, false, "The requested url cannot be found.", json!({}))
}
