use async_trait::async_trait;
use gcal_core::credentials::{ClientSecret, TokenResponse};
use gcal_core::{CalendarError, Result};
use serde_json::Value;

/// The provider's token endpoint: code exchange and refresh grants.
#[async_trait]
pub trait TokenClient: Send + Sync {
    async fn exchange_code(
        &self,
        secret: &ClientSecret,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse>;

    async fn refresh(&self, secret: &ClientSecret, refresh_token: &str) -> Result<TokenResponse>;
}

/// Form-encoded POSTs against `ClientSecret::token_uri`.
#[derive(Debug, Clone)]
pub struct HttpTokenClient {
    http: reqwest::Client,
}

impl HttpTokenClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn post_grant(
        &self,
        secret: &ClientSecret,
        grant: &'static str,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&secret.token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                CalendarError::Connection(format!(
                    "Failed to reach token endpoint {}: {e}",
                    secret.token_uri
                ))
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            CalendarError::Connection(format!("Failed to read token endpoint response: {e}"))
        })?;

        if !status.is_success() {
            let reason = token_error_reason(&bytes);
            tracing::warn!(grant, status = status.as_u16(), reason = %reason, "token grant rejected");
            return Err(CalendarError::Authorization(format!(
                "Token {grant} failed ({}): {reason}",
                status.as_u16()
            )));
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            CalendarError::Protocol(format!("Token endpoint returned an unexpected body: {e}"))
        })
    }
}

#[async_trait]
impl TokenClient for HttpTokenClient {
    async fn exchange_code(
        &self,
        secret: &ClientSecret,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse> {
        self.post_grant(
            secret,
            "exchange",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", &secret.client_id),
                ("client_secret", &secret.client_secret),
                ("code_verifier", code_verifier),
            ],
        )
        .await
    }

    async fn refresh(&self, secret: &ClientSecret, refresh_token: &str) -> Result<TokenResponse> {
        self.post_grant(
            secret,
            "refresh",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &secret.client_id),
                ("client_secret", &secret.client_secret),
            ],
        )
        .await
    }
}

// OAuth error bodies look like {"error":"invalid_grant","error_description":"..."}.
fn token_error_reason(bytes: &[u8]) -> String {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(body) => {
            let error = body.get("error").and_then(Value::as_str);
            let description = body.get("error_description").and_then(Value::as_str);
            match (error, description) {
                (Some(error), Some(description)) => format!("{error}: {description}"),
                (Some(error), None) => error.to_string(),
                _ => body.to_string(),
            }
        }
        Err(_) => String::from_utf8_lossy(bytes).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;

    use super::*;
    use crate::test_support::{secret_with_token_uri, spawn_stub};

    #[tokio::test]
    async fn exchange_posts_authorization_code_form() {
        let router = Router::new().route(
            "/token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form["grant_type"], "authorization_code");
                assert_eq!(form["code"], "auth-code");
                assert_eq!(form["code_verifier"], "verifier");
                assert_eq!(form["redirect_uri"], "http://127.0.0.1:5000/");
                assert_eq!(form["client_id"], "client-id");
                Json(json!({
                    "access_token": "at-1",
                    "refresh_token": "rt-1",
                    "expires_in": 3599,
                    "scope": "a b",
                    "token_type": "Bearer"
                }))
            }),
        );
        let base = spawn_stub(router).await;
        let client = HttpTokenClient::new(reqwest::Client::new());
        let secret = secret_with_token_uri(&format!("{base}/token"));

        let response = client
            .exchange_code(&secret, "auth-code", "http://127.0.0.1:5000/", "verifier")
            .await
            .unwrap();
        assert_eq!(response.access_token, "at-1");
        assert_eq!(response.refresh_token.as_deref(), Some("rt-1"));
        assert_eq!(response.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn revoked_refresh_token_is_an_authorization_error() {
        let router = Router::new().route(
            "/token",
            post(|| async {
                (
                    axum::http::StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "invalid_grant",
                        "error_description": "Token has been expired or revoked."
                    })),
                )
            }),
        );
        let base = spawn_stub(router).await;
        let client = HttpTokenClient::new(reqwest::Client::new());
        let secret = secret_with_token_uri(&format!("{base}/token"));

        let err = client.refresh(&secret, "rt-revoked").await.unwrap_err();
        match err {
            CalendarError::Authorization(msg) => {
                assert!(msg.contains("invalid_grant"));
                assert!(msg.contains("expired or revoked"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_is_a_connection_error() {
        let client = HttpTokenClient::new(reqwest::Client::new());
        let secret = secret_with_token_uri("http://127.0.0.1:9/token");
        let err = client.refresh(&secret, "rt").await.unwrap_err();
        assert!(matches!(err, CalendarError::Connection(_)));
    }

    #[test]
    fn error_reason_falls_back_to_raw_text() {
        assert_eq!(token_error_reason(b"  gateway down \n"), "gateway down");
        assert_eq!(token_error_reason(br#"{"error":"invalid_client"}"#), "invalid_client");
    }
}
