use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

const DEFAULT_ORIGINS: &str = "http://localhost:3000";

/// Build a CORS layer from the `GCAL_CORS_ORIGINS` env var.
///
/// - Origins: comma-separated list (default: `http://localhost:3000`)
/// - Methods: GET, POST, OPTIONS
/// - Headers: Content-Type, Mcp-Session-Id
/// - Max age: 3600s
pub fn build_cors_layer() -> CorsLayer {
    let origins_str =
        std::env::var("GCAL_CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGINS.to_string());
    build_cors_layer_from(&origins_str)
}

pub fn build_cors_layer_from(origins_str: &str) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(parse_origins(origins_str))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("mcp-session-id"),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

fn parse_origins(origins_str: &str) -> Vec<HeaderValue> {
    origins_str
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect()
}
