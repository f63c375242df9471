//! Session lifecycle endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use rmsg_session_core::{RemoveMode, SessionAccess, SessionError};
use rmsg_transport::{AuthVariant, SessionId};

use crate::api::AppState;
use crate::response::{respond, session_not_found};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/find/:id", get(find))
        .route("/status/:id", get(status))
        .route("/add", post(add))
        .route("/delete/:id", delete(del))
}

async fn find(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = SessionId::new(id);
    match state.manager.state(&id).await {
        Some(_) => respond(StatusCode::OK, true, "Session found.", json!({})),
        None => session_not_found(),
    }
}

async fn status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = SessionId::new(id);
    match state.manager.state(&id).await {
        Some(session_state) => {
            respond(StatusCode::OK, true, "", json!({ "state": session_state }))
        }
        None => session_not_found(),
    }
}

#[derive(Debug, Deserialize)]
struct AddRequest {
    id: String,
    #[serde(default, alias = "isLegacy")]
    is_legacy: bool,
}

async fn add(State(state): State<AppState>, Json(body): Json<AddRequest>) -> Response {
    let id = SessionId::new(body.id);
    if state.manager.state(&id).await.is_some() {
        return respond(StatusCode::CONFLICT, false, "Session already exists.", json!({}));
    }

    let variant = if body.is_legacy { AuthVariant::Legacy } else { AuthVariant::Modern };
    match state.manager.get_or_create(&id, variant).await {
        Ok(SessionAccess::Pairing(artifact)) => respond(
            StatusCode::OK,
            true,
            "QR code received, please scan the QR code.",
            json!({ "qr": artifact.qr }),
        ),
        Ok(SessionAccess::Ready) => respond(
            StatusCode::OK,
            true,
            "The session has been successfully created.",
            json!({}),
        ),
        Err(SessionError::PairingPending { .. }) | Err(SessionError::AlreadyExists { .. }) => {
            respond(StatusCode::CONFLICT, false, "Session already exists.", json!({}))
        }
        Err(SessionError::Artifact { .. }) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            "Unable to create QR code.",
            json!({}),
        ),
        Err(e) => {
            warn!(session = %id, error = %e, "session creation failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Unable to create session.",
                json!({}),
            )
        }
    }
}

async fn del(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = SessionId::new(id);
    match state.manager.remove(&id, RemoveMode::Delete).await {
        Ok(()) => respond(
            StatusCode::OK,
            true,
            "The session has been successfully deleted.",
            json!({}),
        ),
        Err(SessionError::NotFound { .. }) => session_not_found(),
        Err(e) => {
            warn!(session = %id, error = %e, "session deletion failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Failed to delete the session.",
                json!({}),
            )
        }
    }
}
