pub mod health;
pub mod mcp_http;
pub mod sse;

use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(mcp_http::router())
        .merge(sse::router())
        .with_state(state)
}

#[cfg(test)]
pub(crate) fn test_state(dir: &std::path::Path) -> AppState {
    let args = gcal_mcp_runtime::RuntimeArgs {
        credentials_path: dir.join("credentials.json"),
        token_path: dir.join("token.json"),
        api_base_url: gcal_mcp_runtime::calendar::DEFAULT_API_BASE_URL.to_string(),
        grant_timeout_secs: 1,
        no_browser: true,
    };
    let runtime = gcal_mcp_runtime::Runtime::build(&args).unwrap();
    AppState::new(&runtime)
}

#[cfg(test)]
pub(crate) fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));
    (app, dir)
}
