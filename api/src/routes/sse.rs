//! Legacy HTTP+SSE transport: one event stream per client, messages posted
//! separately and answered on the stream.

use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use gcal_mcp_runtime::server::{RpcError, error_response};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

const MESSAGES_PATH: &str = "/messages";
const STREAM_BUFFER: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sse", get(open_stream))
        .route(MESSAGES_PATH, post(post_message))
}

#[derive(Debug, Deserialize)]
struct MessagesQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

async fn open_stream(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = Uuid::now_v7();
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(STREAM_BUFFER);

    let endpoint = format!("{MESSAGES_PATH}?sessionId={session_id}");
    // Buffer has room; the first send cannot block.
    let _ = tx
        .send(Ok(Event::default().event("endpoint").data(endpoint)))
        .await;

    state.sse_sessions.write().await.insert(session_id, tx.clone());
    tracing::info!(session_id = %session_id, "sse stream opened");

    // Drop the session as soon as the client goes away.
    let sessions = state.sse_sessions.clone();
    tokio::spawn(async move {
        tx.closed().await;
        sessions.write().await.remove(&session_id);
        tracing::info!(session_id = %session_id, "sse stream closed");
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}

async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    body: Bytes,
) -> Result<Response, AppError> {
    let raw = query.session_id.unwrap_or_default();
    let session_id = Uuid::parse_str(raw.trim()).map_err(|_| AppError::Validation {
        message: format!("'{raw}' is not a valid session id"),
        field: "sessionId".to_string(),
    })?;

    let sender = state
        .sse_sessions
        .read()
        .await
        .get(&session_id)
        .cloned()
        .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

    let responses = match serde_json::from_slice::<Value>(&body) {
        Ok(incoming) => {
            let server = state.server.clone();
            // Tool calls can take a while; the stream carries the answer.
            tokio::spawn(async move {
                let responses = server.handle_incoming_message(incoming).await;
                deliver(&state, session_id, &sender, responses).await;
            });
            return Ok(StatusCode::ACCEPTED.into_response());
        }
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "unparseable sse message");
            vec![error_response(Value::Null, RpcError::parse_error("Parse error"))]
        }
    };

    deliver(&state, session_id, &sender, responses).await;
    Ok(StatusCode::ACCEPTED.into_response())
}

async fn deliver(
    state: &AppState,
    session_id: Uuid,
    sender: &mpsc::Sender<Result<Event, Infallible>>,
    responses: Vec<Value>,
) {
    for response in responses {
        let data = serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"serialization failed"}}"#
                .to_string()
        });
        if sender
            .send(Ok(Event::default().event("message").data(data)))
            .await
            .is_err()
        {
            state.sse_sessions.write().await.remove(&session_id);
            return;
        }
    }
}
