//! Response envelope.
//!
//! Every endpoint answers with the same JSON shape so existing consumers
//! can rely on one contract:
//!
//! ```json
//! { "success": true, "message": "...", "data": {} }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

/// Build an enveloped response. `data` defaults to `{}` at call sites that
/// have nothing to return.
pub fn respond(status: StatusCode, success: bool, message: &str, data: Value) -> Response {
    let body = json!({
        "success": success,
        "message": message,
        "data": data,
    });
    (status, Json(body)).into_response()
}

/// The one 404 every session-scoped endpoint shares.
pub fn session_not_found() -> Response {
    respond(StatusCode::NOT_FOUND, false, "Session not found.", json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_status_and_shape() {
        let response = respond(StatusCode::CONFLICT, false, "Session already exists.", json!({}));
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
