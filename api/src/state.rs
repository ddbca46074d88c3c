use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::response::sse::Event;
use gcal_mcp_runtime::Runtime;
use gcal_mcp_runtime::server::McpServer;
use gcal_mcp_runtime::session::AuthorizationSession;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

pub type SseSender = mpsc::Sender<Result<Event, Infallible>>;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<McpServer>,
    pub session: Arc<AuthorizationSession>,
    /// Open legacy SSE streams, keyed by the session id handed to the client.
    pub sse_sessions: Arc<RwLock<HashMap<Uuid, SseSender>>>,
}

impl AppState {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            server: Arc::clone(&runtime.server),
            session: Arc::clone(&runtime.session),
            sse_sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
