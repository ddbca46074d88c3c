//! JSON-RPC 2.0 front end for the tool dispatcher.

use std::sync::Arc;

use gcal_core::CalendarError;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dispatch::Dispatcher;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "Google Calendar Service";

#[derive(Debug)]
pub struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            code: -32603,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// How a message arrived; replies go back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line.
    Newline,
    /// LSP-style `Content-Length` header block.
    ContentLength,
}

/// One message read off the wire. `payload` is `Err` when the bytes were
/// not JSON, so the caller can answer with a parse error and keep going.
#[derive(Debug)]
pub struct Frame {
    pub framing: Framing,
    pub payload: Result<Value, String>,
}

pub struct McpServer {
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Answer messages from `reader` until it is exhausted.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(
            event = "mcp_server_ready",
            server = MCP_SERVER_NAME,
            version = env!("CARGO_PKG_VERSION"),
            "serving MCP"
        );
        loop {
            let frame = read_framed_json(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(frame) = frame else {
                break;
            };

            let responses = match frame.payload {
                Ok(incoming) => self.handle_incoming_message(incoming).await,
                Err(message) => vec![error_response(Value::Null, RpcError::parse_error(message))],
            };
            for response in responses {
                write_framed_json(&mut writer, &response, frame.framing)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }
        tracing::info!(event = "mcp_server_closed", "input closed");
        Ok(())
    }

    /// Handle a single request, a notification, or a batch. Notifications
    /// produce no response.
    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A response from the client; this server never sends requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            let result = self.handle_request(method, params).await;
            Some(match result {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            tracing::debug!(method, "ignoring notification");
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.dispatcher.registry().tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        match self.dispatcher.dispatch(name, arguments).await {
            Ok(result) => serde_json::to_value(result)
                .map_err(|e| RpcError::internal(format!("Failed to encode tool result: {e}"))),
            Err(err @ CalendarError::UnknownTool(_)) => {
                Err(RpcError::invalid_params(format!("Unknown tool: {name}")).with_data(err.to_value()))
            }
            Err(err) => Ok(tool_error_result(&err)),
        }
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            },
            "resources": {
                "listChanged": false
            },
            "prompts": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": "Calendar tools for the authorized account. Call list_calendars to find calendar IDs. Dates are calendar days in YYYY-MM-DD; list_calendar_events includes both endsAt and startsAt days."
    })
}

fn tool_error_result(err: &CalendarError) -> Value {
    let payload = err.to_value();
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| err.to_string());
    json!({
        "isError": true,
        "content": [{ "type": "text", "text": text }],
        "structuredContent": payload
    })
}

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

/// Read the next message in either framing. `None` at a clean end of input.
///
/// A line that is neither JSON nor a framing header comes back as a
/// newline frame with an `Err` payload; only I/O failures end the stream.
pub async fn read_framed_json<R>(reader: &mut R) -> Result<Option<Frame>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let first = loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            break trimmed.to_string();
        }
    };

    if first.starts_with('{') || first.starts_with('[') {
        return Ok(Some(Frame {
            framing: Framing::Newline,
            payload: serde_json::from_str(&first).map_err(|e| format!("Invalid JSON payload: {e}")),
        }));
    }

    let Some(header) = parse_header(&first) else {
        return Ok(Some(Frame {
            framing: Framing::Newline,
            payload: Err(format!("Invalid JSON payload: unexpected input '{first}'")),
        }));
    };

    // Header block: any order, unknown headers ignored, ends at a blank line.
    let mut content_length: Option<Result<usize, String>> = None;
    let mut pending = Some(header);
    loop {
        if let Some((name, value)) = pending.take() {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("Invalid Content-Length header '{value}'")),
                );
            }
        }

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        pending = trimmed
            .split_once(':')
            .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()));
    }

    let content_length = match content_length {
        Some(Ok(length)) => length,
        Some(Err(message)) => {
            return Ok(Some(Frame {
                framing: Framing::ContentLength,
                payload: Err(message),
            }));
        }
        None => {
            return Ok(Some(Frame {
                framing: Framing::ContentLength,
                payload: Err("Missing Content-Length header".to_string()),
            }));
        }
    };

    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        framing: Framing::ContentLength,
        payload: serde_json::from_slice(&payload).map_err(|e| format!("Invalid JSON payload: {e}")),
    }))
}

/// Recognise the first line of a header block. Only the framing headers
/// open one, so a stray `Note: ...` log line is not mistaken for a block.
fn parse_header(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("content-type") {
        Some((name.to_string(), value.trim().to_string()))
    } else {
        None
    }
}

pub async fn write_framed_json<W>(
    writer: &mut W,
    value: &Value,
    framing: Framing,
) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
        Framing::Newline => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
    }
    writer.flush().await?;
    Ok(())
}
