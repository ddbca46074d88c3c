use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use gcal_mcp_runtime::server::{RpcError, error_response};
use serde_json::Value;

use crate::state::AppState;

const MCP_PATH: &str = "/mcp";

pub fn router() -> Router<AppState> {
    Router::new().route(MCP_PATH, post(mcp_post).get(mcp_get))
}

// Streamable HTTP without server-initiated streams.
async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn mcp_post(State(state): State<AppState>, body: Bytes) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::debug!(error = %e, "rejecting unparseable MCP request");
            return (
                StatusCode::OK,
                Json(error_response(Value::Null, RpcError::parse_error("Parse error"))),
            )
                .into_response();
        }
    };

    let mut responses = state.server.handle_incoming_message(incoming).await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 {
        return (StatusCode::OK, Json(responses.remove(0))).into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::test_app;

    async fn post_mcp(body: &str) -> (StatusCode, Option<Value>) {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(
                Request::post("/mcp")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).ok();
        (status, value)
    }

    #[tokio::test]
    async fn single_request_gets_a_single_response() {
        let (status, body) = post_mcp(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await;
        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn batch_gets_an_array() {
        let (_, body) = post_mcp(
            r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","id":2,"method":"ping"}]"#,
        )
        .await;
        assert_eq!(body.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn notification_only_is_accepted() {
        let (status, body) =
            post_mcp(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn garbage_is_a_parse_error() {
        let (status, body) = post_mcp("{oops").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.unwrap()["error"]["code"], json!(-32700));
    }

    #[tokio::test]
    async fn get_is_not_allowed() {
        let (app, _dir) = test_app();
        let response = app
            .oneshot(Request::get("/mcp").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
