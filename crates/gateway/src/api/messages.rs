//! Direct messaging endpoints.

use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use rmsg_session_core::SessionError;
use rmsg_transport::{Jid, MessageContent, SessionId};

use crate::api::{AppState, SessionQuery};
use crate::response::{respond, session_not_found};

/// Settle delay applied before each send unless the request overrides it.
const DEFAULT_SEND_DELAY_MS: u64 = 1000;

pub fn routes() -> Router<AppState> {
    Router::new().route("/send", post(send))
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    receiver: String,
    message: String,
    /// Settle delay override in milliseconds.
    #[serde(default)]
    delay: Option<u64>,
}

async fn send(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(body): Json<SendRequest>,
) -> Response {
    let id = SessionId::new(query.id);
    let handle = match state.manager.acquire(&id).await {
        Ok(handle) => handle,
        Err(SessionError::NotFound { .. }) => return session_not_found(),
        Err(_) => {
            return respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                "Failed to send the message.",
                json!({}),
            )
        }
    };

    let receiver = Jid::user(body.receiver.as_str());
    match handle.exists(&receiver).await {
        Ok(true) => {}
        // An unreachable number and a lookup failure answer the same way.
        Ok(false) | Err(_) => {
            return respond(
                StatusCode::BAD_REQUEST,
                false,
                "The receiver number is not exists.",
                json!({}),
            )
        }
    }

    let delay = Duration::from_millis(body.delay.unwrap_or(DEFAULT_SEND_DELAY_MS));
    match handle.send_message(&receiver, MessageContent::text(body.message.as_str()), delay).await
    {
        Ok(_) => respond(
            StatusCode::OK,
            true,
            "The message has been successfully sent.",
            json!({}),
        ),
        Err(_) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            "Failed to send the message.",
            json!({}),
        ),
    }
}
