//! Shared fakes and stub servers for runtime tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gcal_core::calendar::{CalendarListPage, DateRange, Event, EventDraft, EventPage};
use gcal_core::credentials::{ClientSecret, CredentialSet, TokenResponse};
use gcal_core::store::CredentialStore;
use gcal_core::{CalendarError, Result};
use serde_json::{Map, json};
use tokio::sync::Mutex;

use crate::calendar::CalendarApi;
use crate::grant::GrantFlow;
use crate::oauth::TokenClient;

/// Serve `router` on an ephemeral loopback port; returns its base URL.
pub(crate) async fn spawn_stub(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub(crate) fn secret_with_token_uri(token_uri: &str) -> ClientSecret {
    ClientSecret {
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        redirect_uri: Some("http://127.0.0.1".to_string()),
        auth_uri: "https://accounts.example.test/auth".to_string(),
        token_uri: token_uri.to_string(),
    }
}

pub(crate) fn write_descriptor(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("credentials.json");
    std::fs::write(&path, body).unwrap();
    path
}

pub(crate) const VALID_DESCRIPTOR: &str = r#"{"installed":{"client_id":"client-id","client_secret":"client-secret","redirect_uris":["http://localhost"]}}"#;

pub(crate) fn credentials(access_token: &str) -> CredentialSet {
    CredentialSet {
        access_token: access_token.to_string(),
        refresh_token: Some(format!("{access_token}-refresh")),
        expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        scopes: gcal_core::auth::CALENDAR_SCOPES
            .iter()
            .map(|s| s.to_string())
            .collect(),
        token_type: Some("Bearer".to_string()),
    }
}

/// In-memory store that counts every access.
#[derive(Default)]
pub(crate) struct CountingStore {
    pub(crate) stored: Mutex<Option<CredentialSet>>,
    pub(crate) loads: AtomicUsize,
    pub(crate) saves: AtomicUsize,
    pub(crate) fail_saves: bool,
}

impl CountingStore {
    pub(crate) fn with(credentials: CredentialSet) -> Self {
        Self {
            stored: Mutex::new(Some(credentials)),
            ..Self::default()
        }
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn load(&self) -> Option<CredentialSet> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.stored.lock().await.clone()
    }

    async fn save(&self, credentials: &CredentialSet) -> std::io::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            ));
        }
        *self.stored.lock().await = Some(credentials.clone());
        Ok(())
    }
}

/// Grant flow that hands out `granted-<n>` tokens after a short pause.
#[derive(Default)]
pub(crate) struct CountingGrant {
    pub(crate) runs: AtomicUsize,
}

impl CountingGrant {
    pub(crate) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrantFlow for CountingGrant {
    async fn run(&self, _secret: &ClientSecret, _scopes: &[&str]) -> Result<CredentialSet> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        // Long enough for concurrent callers to pile up behind the latch.
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(credentials(&format!("granted-{n}")))
    }
}

/// Token endpoint double: refresh succeeds with `refreshed-<n>` unless
/// `revoked` is set.
#[derive(Default)]
pub(crate) struct StubTokens {
    pub(crate) refreshes: AtomicUsize,
    pub(crate) revoked: bool,
}

#[async_trait]
impl TokenClient for StubTokens {
    async fn exchange_code(
        &self,
        _secret: &ClientSecret,
        code: &str,
        _redirect_uri: &str,
        _code_verifier: &str,
    ) -> Result<TokenResponse> {
        Ok(TokenResponse {
            access_token: format!("exchanged-{code}"),
            expires_in: Some(3600),
            refresh_token: Some("rt".to_string()),
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn refresh(&self, _secret: &ClientSecret, _refresh_token: &str) -> Result<TokenResponse> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.revoked {
            return Err(CalendarError::Authorization(
                "Token refresh failed (400): invalid_grant".to_string(),
            ));
        }
        Ok(TokenResponse {
            access_token: format!("refreshed-{n}"),
            expires_in: Some(3600),
            refresh_token: None,
            scope: None,
            token_type: None,
        })
    }
}

/// Calendar double that records every call it receives.
#[derive(Default)]
pub(crate) struct RecordingCalendar {
    calls: std::sync::Mutex<Vec<String>>,
}

impl RecordingCalendar {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn event(id: &str, summary: &str) -> Event {
    let mut event = Map::new();
    event.insert("id".to_string(), json!(id));
    event.insert("summary".to_string(), json!(summary));
    event
}

#[async_trait]
impl CalendarApi for RecordingCalendar {
    async fn list_calendars(&self, page_token: Option<&str>) -> Result<CalendarListPage> {
        self.record(format!("list_calendars {page_token:?}"));
        Ok(CalendarListPage {
            items: vec![json!({"id": "primary"})],
            next_page_token: None,
            extra: Map::new(),
        })
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        range: DateRange,
        page_token: Option<&str>,
    ) -> Result<EventPage> {
        self.record(format!(
            "list_events {calendar_id} {} {} {page_token:?}",
            range.time_min().to_rfc3339(),
            range.time_max().to_rfc3339()
        ));
        Ok(EventPage {
            items: Vec::new(),
            next_page_token: None,
            extra: Map::new(),
        })
    }

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Result<Event> {
        self.record(format!("create_event {calendar_id} {}", draft.summary));
        Ok(event("new", &draft.summary))
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event> {
        self.record(format!("get_event {calendar_id} {event_id}"));
        Ok(event(event_id, "Existing"))
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<Event> {
        self.record(format!("update_event {calendar_id} {event_id} {}", draft.summary));
        Ok(event(event_id, &draft.summary))
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        self.record(format!("delete_event {calendar_id} {event_id}"));
        Ok(())
    }
}
