//! Group messaging and metadata endpoints.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use rmsg_session_core::{SessionError, SessionHandle};
use rmsg_transport::{GroupMetadata, Jid, MessageContent, SessionId, TransportError};

use crate::api::{AppState, SessionQuery};
use crate::response::{respond, session_not_found};

const SEND_DELAY_MS: u64 = 1000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/meta/:jid", get(metadata))
        .route("/send", post(send))
}

/// Shape group metadata the way existing consumers read it.
fn shape_group(group: &GroupMetadata) -> Value {
    json!({
        "id": group.id.as_str(),
        "subject": group.subject,
        "description": group.description,
        "participants": group
            .participants
            .iter()
            .map(|p| json!({
                "id": p.id.as_str(),
                "admin": p.admin,
                "isSuperAdmin": p.super_admin,
            }))
            .collect::<Vec<_>>(),
        "creation": group.creation,
        "owner": group.owner.as_ref().map(Jid::as_str),
        "memberCount": group.member_count(),
    })
}

async fn acquire(
    state: &AppState,
    query: SessionQuery,
    failure: &str,
) -> Result<std::sync::Arc<SessionHandle>, Response> {
    let id = SessionId::new(query.id);
    state.manager.acquire(&id).await.map_err(|e| match e {
        SessionError::NotFound { .. } => session_not_found(),
        _ => respond(StatusCode::INTERNAL_SERVER_ERROR, false, failure, json!({})),
    })
}

async fn list(State(state): State<AppState>, Query(query): Query<SessionQuery>) -> Response {
    let handle = match acquire(&state, query, "Failed to fetch groups list").await {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    match handle.all_groups().await {
        Ok(groups) => {
            let shaped: Vec<Value> = groups.iter().map(shape_group).collect();
            respond(StatusCode::OK, true, "All group fetched successfully", json!(shaped))
        }
        Err(_) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            "Failed to fetch groups list",
            json!({}),
        ),
    }
}

async fn metadata(
    State(state): State<AppState>,
    Path(jid): Path<String>,
    Query(query): Query<SessionQuery>,
) -> Response {
    let handle = match acquire(&state, query, "Failed to get group metadata.").await {
        Ok(handle) => handle,
        Err(response) => return response,
    };
    match handle.group_metadata(&Jid::group(&jid)).await {
        Ok(group) => respond(StatusCode::OK, true, "", shape_group(&group)),
        Err(SessionError::Transport(TransportError::GroupNotFound { .. })) => {
            respond(StatusCode::BAD_REQUEST, false, "The group is not exists.", json!({}))
        }
        Err(_) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            "Failed to get group metadata.",
            json!({}),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    receiver: String,
    message: String,
}

async fn send(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    Json(body): Json<SendRequest>,
) -> Response {
    let handle = match acquire(&state, query, "Failed to send the message.").await {
        Ok(handle) => handle,
        Err(response) => return response,
    };

    let receiver = Jid::group(body.receiver.as_str());
    match handle.exists(&receiver).await {
        Ok(true) => {}
        Ok(false) | Err(_) => {
            return respond(
                StatusCode::BAD_REQUEST,
                false,
                "The group is not exists.",
                json!({}),
            )
        }
    }

    let delay = Duration::from_millis(SEND_DELAY_MS);
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
