use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Transport-level failures. Tool and protocol errors travel inside
/// JSON-RPC responses instead.
#[derive(Debug)]
pub enum AppError {
    /// Malformed request parameter (400)
    Validation { message: String, field: String },
    /// No open SSE stream for this session id (404)
    SessionNotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation { message, field } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": gcal_core::error::codes::VALIDATION_FAILED,
                    "message": message,
                    "field": field,
                }),
            ),
            AppError::SessionNotFound(session_id) => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": "session_not_found",
                    "message": format!("No open SSE session '{session_id}'"),
                    "docs_hint": "Open GET /sse first and post to the endpoint it announces.",
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}
