//! Calendar tool runtime: OAuth session, calendar client, tool dispatcher
//! and the MCP server in front of them.

use std::sync::Arc;
use std::time::Duration;

use gcal_core::store::FileCredentialStore;
use gcal_core::{CalendarError, Result};
use serde_json::Value;

pub mod calendar;
pub mod config;
pub mod dispatch;
pub mod grant;
pub mod oauth;
pub mod server;
pub mod session;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use config::{McpCommands, RuntimeArgs};

use calendar::GoogleCalendarClient;
use dispatch::Dispatcher;
use grant::LoopbackGrantFlow;
use oauth::{HttpTokenClient, TokenClient};
use server::McpServer;
use session::AuthorizationSession;
use tools::ToolRegistry;

/// Everything one process needs, wired around a single session.
pub struct Runtime {
    pub session: Arc<AuthorizationSession>,
    pub store: Arc<FileCredentialStore>,
    pub server: Arc<McpServer>,
}

impl Runtime {
    /// Wire the runtime. No I/O happens until the session is first used.
    pub fn build(args: &RuntimeArgs) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gcal-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CalendarError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        let tokens: Arc<dyn TokenClient> = Arc::new(HttpTokenClient::new(http.clone()));
        let grant = Arc::new(LoopbackGrantFlow::new(
            Arc::clone(&tokens),
            Duration::from_secs(args.grant_timeout_secs),
            !args.no_browser,
        ));
        let store = Arc::new(FileCredentialStore::new(&args.token_path));
        let session = Arc::new(AuthorizationSession::new(
            &args.credentials_path,
            store.clone(),
            grant,
            tokens,
        ));

        let calendar = Arc::new(GoogleCalendarClient::new(
            http,
            &args.api_base_url,
            Arc::clone(&session),
        )?);
        let dispatcher = Arc::new(Dispatcher::new(ToolRegistry::new(), calendar));
        let server = Arc::new(McpServer::new(dispatcher));

        Ok(Self {
            session,
            store,
            server,
        })
    }

    /// Build and authorize. Any failure here is fatal: nothing should accept
    /// tool calls without a usable credential.
    pub async fn start(args: &RuntimeArgs) -> Result<Self> {
        let runtime = Self::build(args)?;
        let handle = runtime.session.authorize().await?;
        let credentials = handle.credentials().await;
        tracing::info!(
            event = "authorized",
            token_path = %runtime.store.path().display(),
            expires_at = ?credentials.expires_at,
            renewable = credentials.is_renewable(),
            "calendar access ready"
        );
        Ok(runtime)
    }
}

pub async fn run(args: RuntimeArgs, command: McpCommands) -> i32 {
    match command {
        McpCommands::Serve => {
            let runtime = match Runtime::start(&args).await {
                Ok(runtime) => runtime,
                Err(err) => return report_fatal(&err),
            };
            match runtime.server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    let payload = serde_json::json!({
                        "error": "mcp_server_error",
                        "message": err,
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
    }
}

/// Print `err` as a structured payload on stderr; returns the exit code.
pub fn report_fatal(err: &CalendarError) -> i32 {
    tracing::error!(error_code = err.code(), error = %err, "startup failed");
    eprintln!("{}", to_pretty_json(&err.to_value()));
    1
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}
