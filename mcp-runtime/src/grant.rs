//! Interactive authorization-code grant over a loopback redirect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gcal_core::auth::{generate_code_challenge, generate_code_verifier, generate_state};
use gcal_core::credentials::{ClientSecret, CredentialSet};
use gcal_core::{CalendarError, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::oauth::TokenClient;

const DEFAULT_REDIRECT_URI: &str = "http://localhost";
const SUCCESS_HTML: &str = "<html><body><h1>Calendar access granted</h1><p>You can close this tab.</p></body></html>";
const ERROR_HTML: &str = "<html><body><h1>Authorization failed</h1><p>Close this tab and check the terminal.</p></body></html>";

/// Obtains a fresh credential set with the resource owner in the loop.
#[async_trait]
pub trait GrantFlow: Send + Sync {
    async fn run(&self, secret: &ClientSecret, scopes: &[&str]) -> Result<CredentialSet>;
}

/// Opens the consent page in a browser and waits for the provider to
/// redirect back to a local listener.
pub struct LoopbackGrantFlow {
    tokens: Arc<dyn TokenClient>,
    timeout: Duration,
    open_browser: bool,
}

impl LoopbackGrantFlow {
    pub fn new(tokens: Arc<dyn TokenClient>, timeout: Duration, open_browser: bool) -> Self {
        Self {
            tokens,
            timeout,
            open_browser,
        }
    }
}

#[async_trait]
impl GrantFlow for LoopbackGrantFlow {
    async fn run(&self, secret: &ClientSecret, scopes: &[&str]) -> Result<CredentialSet> {
        let pending = PendingGrant::start(secret, scopes).await?;

        tracing::info!(
            event = "oauth_consent_required",
            redirect_uri = %pending.redirect_uri,
            "Open this URL to grant calendar access: {}",
            pending.consent_url
        );
        if self.open_browser {
            if let Err(e) = open::that(pending.consent_url.as_str()) {
                tracing::warn!(error = %e, "could not open a browser; visit the URL manually");
            }
        }

        pending
            .complete(self.tokens.as_ref(), secret, self.timeout)
            .await
    }
}

/// A consent request that has been issued but not yet answered.
pub struct PendingGrant {
    listeners: Vec<TcpListener>,
    callback_path: String,
    redirect_uri: String,
    consent_url: Url,
    state: String,
    code_verifier: String,
}

impl PendingGrant {
    /// Bind the callback listener and build the consent URL.
    pub async fn start(secret: &ClientSecret, scopes: &[&str]) -> Result<Self> {
        let target = RedirectTarget::parse(secret.redirect_uri.as_deref())?;
        let (primary, secondary) = target.bind_hosts.split_first().ok_or_else(|| {
            CalendarError::Configuration("Redirect URI has no loopback address".to_string())
        })?;
        let listener = TcpListener::bind((*primary, target.port))
            .await
            .map_err(|e| {
                CalendarError::Authorization(format!(
                    "Failed to start OAuth callback listener on {primary}:{}: {e}",
                    target.port
                ))
            })?;
        let port = listener
            .local_addr()
            .map_err(|e| {
                CalendarError::Authorization(format!("OAuth callback listener has no address: {e}"))
            })?
            .port();

        // `localhost` may resolve to either family; listen on both when we can.
        let mut listeners = vec![listener];
        for host in secondary {
            match TcpListener::bind((*host, port)).await {
                Ok(extra) => listeners.push(extra),
                Err(e) => tracing::debug!(host = *host, port, error = %e, "loopback address unavailable"),
            }
        }

        let redirect_uri = target.redirect_uri(port);
        let code_verifier = generate_code_verifier();
        let state = generate_state();
        let consent_url = consent_url(
            secret,
            &redirect_uri,
            scopes,
            &state,
            &generate_code_challenge(&code_verifier),
        )?;

        Ok(Self {
            listeners,
            callback_path: target.path,
            redirect_uri,
            consent_url,
            state,
            code_verifier,
        })
    }

    pub fn consent_url(&self) -> &Url {
        &self.consent_url
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect, check it, and exchange the code.
    pub async fn complete(
        self,
        tokens: &dyn TokenClient,
        secret: &ClientSecret,
        timeout: Duration,
    ) -> Result<CredentialSet> {
        let callback = tokio::time::timeout(
            timeout,
            wait_for_callback(&self.listeners, &self.callback_path),
        )
        .await
        .map_err(|_| {
            CalendarError::Authorization(format!(
                "Authorization timed out after {} seconds",
                timeout.as_secs()
            ))
        })??;

        if let Some(error) = callback.error {
            let detail = callback
                .error_description
                .map(|d| format!("{error}: {d}"))
                .unwrap_or(error);
            return Err(CalendarError::Authorization(format!(
                "Authorization was not granted: {detail}"
            )));
        }
        if callback.state.as_deref() != Some(self.state.as_str()) {
            return Err(CalendarError::Authorization(
                "OAuth state mismatch; the callback did not come from this authorization request"
                    .to_string(),
            ));
        }
        let code = callback.code.ok_or_else(|| {
            CalendarError::Authorization("No 'code' parameter in OAuth callback".to_string())
        })?;

        let response = tokens
            .exchange_code(secret, &code, &self.redirect_uri, &self.code_verifier)
            .await?;
        tracing::info!(event = "oauth_grant_completed", "calendar access granted");
        Ok(CredentialSet::from_token_response(response, Utc::now()))
    }
}

/// Parameters the provider appends to the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CallbackParams {
    pub(crate) code: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RedirectTarget {
    scheme: String,
    host: String,
    bind_hosts: Vec<&'static str>,
    port: u16,
    path: String,
}

impl RedirectTarget {
    /// Only loopback HTTP redirects can be served locally.
    fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = raw.unwrap_or(DEFAULT_REDIRECT_URI);
        let url = Url::parse(raw).map_err(|e| {
            CalendarError::Configuration(format!("Invalid redirect URI '{raw}': {e}"))
        })?;
        let host = url.host_str().unwrap_or_default().to_string();
        let bind_hosts = match host.as_str() {
            "localhost" => vec!["127.0.0.1", "::1"],
            "127.0.0.1" => vec!["127.0.0.1"],
            "[::1]" | "::1" => vec!["::1"],
            _ => {
                return Err(CalendarError::Configuration(format!(
                    "Redirect URI '{raw}' must point at localhost for the interactive grant flow"
                )));
            }
        };
        if url.scheme() != "http" {
            return Err(CalendarError::Configuration(format!(
                "Redirect URI '{raw}' must use http for the loopback listener"
            )));
        }
        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            bind_hosts,
            port: url.port().unwrap_or(0),
            path: url.path().to_string(),
        })
    }

    fn redirect_uri(&self, port: u16) -> String {
        format!("{}://{}:{port}{}", self.scheme, self.host, self.path)
    }
}

fn consent_url(
    secret: &ClientSecret,
    redirect_uri: &str,
    scopes: &[&str],
    state: &str,
    code_challenge: &str,
) -> Result<Url> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &secret.auth_uri,
        [
            ("response_type", "code"),
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("access_type", "offline"),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| {
        CalendarError::Configuration(format!("Invalid auth_uri '{}': {e}", secret.auth_uri))
    })
}

/// Accept connections until one hits `callback_path`; anything else (a
/// browser asking for /favicon.ico, say) gets a 404.
pub(crate) async fn wait_for_callback(
    listeners: &[TcpListener],
    callback_path: &str,
) -> Result<CallbackParams> {
    loop {
        let mut stream = accept_any(listeners).await.map_err(|e| {
            CalendarError::Authorization(format!("OAuth callback listener failed: {e}"))
        })?;

        let mut buf = vec![0u8; 8192];
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "dropped unreadable callback connection");
                continue;
            }
        };
        let request = String::from_utf8_lossy(&buf[..n]);

        // GET /callback?code=...&state=... HTTP/1.1
        let target = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or("");
        let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
            let _ = respond(&mut stream, "400 Bad Request", ERROR_HTML).await;
            continue;
        };
        if url.path() != callback_path {
            let _ = respond(&mut stream, "404 Not Found", "").await;
            continue;
        }

        let mut params = CallbackParams::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }

        let page = if params.code.is_some() && params.error.is_none() {
            SUCCESS_HTML
        } else {
            ERROR_HTML
        };
        if let Err(e) = respond(&mut stream, "200 OK", page).await {
            tracing::debug!(error = %e, "failed to answer OAuth callback");
        }
        return Ok(params);
    }
}

async fn accept_any(listeners: &[TcpListener]) -> std::io::Result<TcpStream> {
    let accepted = match listeners {
        [] => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no callback listener",
            ));
        }
        [only] => only.accept().await,
        [first, second, ..] => tokio::select! {
            accepted = first.accept() => accepted,
            accepted = second.accept() => accepted,
        },
    };
    accepted.map(|(stream, _)| stream)
}

async fn respond(
    stream: &mut TcpStream,
    status: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}
