use std::fmt;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, Result};

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Access tokens are treated as expired this long before their stated expiry,
/// so a request never leaves with a token that dies in flight.
pub const EXPIRY_SKEW_MINUTES: i64 = 5;

/// One delegated-access token set, as persisted in `token.json`.
///
/// Field names follow the provider client libraries (`expiry_date` in epoch
/// milliseconds, `scope` space-separated) so token files written by other
/// tooling load unchanged.
///
/// `expires_at` is stored at millisecond precision. The constructors here
/// truncate to match, so a set they produce survives a save/load unchanged;
/// a hand-built set with a finer expiry comes back truncated.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        rename = "expiry_date",
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(
        rename = "scope",
        default,
        with = "scope_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Token endpoint response for both the code exchange and refresh grants.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl CredentialSet {
    pub fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_at: response.expires_in.map(|secs| expiry_from(now, secs)),
            scopes: response
                .scope
                .as_deref()
                .map(split_scopes)
                .unwrap_or_default(),
            token_type: response.token_type,
        }
    }

    /// Fold a refresh-grant response into this set. The provider usually
    /// omits the refresh token on refresh; the existing one is kept then.
    pub fn apply_refresh(&mut self, response: TokenResponse, now: DateTime<Utc>) {
        self.access_token = response.access_token;
        self.expires_at = response.expires_in.map(|secs| expiry_from(now, secs));
        if let Some(refresh_token) = response.refresh_token.filter(|t| !t.is_empty()) {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = response.scope.as_deref() {
            self.scopes = split_scopes(scope);
        }
        if response.token_type.is_some() {
            self.token_type = response.token_type;
        }
    }

    /// A set without an expiry is taken at face value.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now + Duration::minutes(EXPIRY_SKEW_MINUTES) >= expires_at,
            None => false,
        }
    }

    pub fn is_renewable(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("token_type", &self.token_type)
            .finish()
    }
}

// Millisecond precision, matching what the token file can hold.
fn expiry_from(now: DateTime<Utc>, expires_in_secs: i64) -> DateTime<Utc> {
    let expires_at = now + Duration::seconds(expires_in_secs);
    DateTime::from_timestamp_millis(expires_at.timestamp_millis()).unwrap_or(expires_at)
}

fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

mod scope_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(scopes: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&scopes.join(" "))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(super::split_scopes).unwrap_or_default())
    }
}

/// Application identity from the OAuth client descriptor file.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    /// First entry of `redirect_uris`, when the descriptor lists any.
    pub redirect_uri: Option<String>,
    pub auth_uri: String,
    pub token_uri: String,
}

#[derive(Deserialize)]
struct Descriptor {
    web: Option<DescriptorSection>,
    installed: Option<DescriptorSection>,
}

#[derive(Deserialize, Default)]
struct DescriptorSection {
    client_id: Option<String>,
    client_secret: Option<String>,
    #[serde(default)]
    redirect_uris: Vec<String>,
    auth_uri: Option<String>,
    token_uri: Option<String>,
}

impl ClientSecret {
    /// Read and validate the descriptor at `path`.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CalendarError::Configuration(format!(
                    "Credentials file not found at: {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(CalendarError::Configuration(format!(
                    "Failed to read credentials file {}: {e}",
                    path.display()
                )));
            }
        };
        Self::from_descriptor_json(&raw)
    }

    /// Parse a descriptor with a `web` or `installed` section. Each field is
    /// taken from `web` first and falls back to `installed`.
    pub fn from_descriptor_json(raw: &str) -> Result<Self> {
        let descriptor: Descriptor = serde_json::from_str(raw).map_err(|e| {
            CalendarError::Configuration(format!("Invalid credentials file format: {e}"))
        })?;
        let web = descriptor.web.unwrap_or_default();
        let installed = descriptor.installed.unwrap_or_default();

        let pick = |a: Option<String>, b: Option<String>| {
            a.filter(|v| !v.trim().is_empty())
                .or_else(|| b.filter(|v| !v.trim().is_empty()))
        };

        let client_id = pick(web.client_id, installed.client_id);
        let client_secret = pick(web.client_secret, installed.client_secret);
        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            return Err(CalendarError::Configuration(
                "Invalid credentials file format: client_id and client_secret are required"
                    .to_string(),
            ));
        };

        let redirect_uri = web
            .redirect_uris
            .into_iter()
            .next()
            .or_else(|| installed.redirect_uris.into_iter().next());

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            auth_uri: pick(web.auth_uri, installed.auth_uri)
                .unwrap_or_else(|| GOOGLE_AUTH_URI.to_string()),
            token_uri: pick(web.token_uri, installed.token_uri)
                .unwrap_or_else(|| GOOGLE_TOKEN_URI.to_string()),
        })
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSecret")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
