use std::sync::Arc;

use async_trait::async_trait;
use gcal_core::calendar::{CalendarListPage, DateRange, Event, EventDraft, EventPage};
use gcal_core::{CalendarError, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::session::AuthorizationSession;

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// The remote calendar operations the tools are built on.
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_calendars(&self, page_token: Option<&str>) -> Result<CalendarListPage>;

    /// Single events in `range`, ordered by start time.
    async fn list_events(
        &self,
        calendar_id: &str,
        range: DateRange,
        page_token: Option<&str>,
    ) -> Result<EventPage>;

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Result<Event>;

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event>;

    /// Full replace of the event's mutable fields.
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<Event>;

    /// Succeeds when the event is already gone.
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()>;
}

/// Calendar v3 REST client authorized through the session.
pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<AuthorizationSession>,
}

impl GoogleCalendarClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        session: Arc<AuthorizationSession>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            CalendarError::Configuration(format!("Invalid calendar API URL '{base_url}': {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CalendarError::Configuration(format!(
                "Calendar API URL '{base_url}' cannot take path segments"
            )));
        }
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    // Ids are appended as encoded segments; calendar ids routinely contain
    // '@' and '#'.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                CalendarError::Configuration(format!(
                    "Calendar API URL '{}' cannot take path segments",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<(StatusCode, Vec<u8>)> {
        let handle = self.session.authorize().await?;
        let token = handle.access_token().await?;

        let path = url.path().to_string();
        let mut request = self.http.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            CalendarError::Connection(format!("Failed to reach calendar API: {e}"))
        })?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            CalendarError::Connection(format!("Failed to read calendar API response: {e}"))
        })?;
        tracing::debug!(method = %method, path = %path, status = status.as_u16(), "calendar api call");

        if status == StatusCode::UNAUTHORIZED {
            handle.invalidate().await;
            return Err(CalendarError::Authorization(format!(
                "Calendar API rejected the access token: {}",
                provider_message(&bytes)
            )));
        }
        Ok((status, bytes.to_vec()))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T> {
        let (status, bytes) = self.send(method, url, body).await?;
        if !status.is_success() {
            return Err(remote_error(status, &bytes));
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            CalendarError::Protocol(format!("Calendar API returned an unexpected body: {e}"))
        })
    }
}

#[async_trait]
impl CalendarApi for GoogleCalendarClient {
    async fn list_calendars(&self, page_token: Option<&str>) -> Result<CalendarListPage> {
        let mut url = self.url(&["users", "me", "calendarList"])?;
        if let Some(page_token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", page_token);
        }
        self.call(Method::GET, url, None).await
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        range: DateRange,
        page_token: Option<&str>,
    ) -> Result<EventPage> {
        let mut url = self.url(&["calendars", calendar_id, "events"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("timeMin", &range.time_min().to_rfc3339())
                .append_pair("timeMax", &range.time_max().to_rfc3339())
                .append_pair("singleEvents", "true")
                .append_pair("orderBy", "startTime");
            if let Some(page_token) = page_token {
                query.append_pair("pageToken", page_token);
            }
        }
        self.call(Method::GET, url, None).await
    }

    async fn create_event(&self, calendar_id: &str, draft: &EventDraft) -> Result<Event> {
        let url = self.url(&["calendars", calendar_id, "events"])?;
        self.call(Method::POST, url, Some(draft.to_insert_body()))
            .await
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Event> {
        let url = self.url(&["calendars", calendar_id, "events", event_id])?;
        self.call(Method::GET, url, None).await
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        draft: &EventDraft,
    ) -> Result<Event> {
        let url = self.url(&["calendars", calendar_id, "events", event_id])?;
        self.call(Method::PUT, url, Some(draft.to_replace_body()))
            .await
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        let url = self.url(&["calendars", calendar_id, "events", event_id])?;
        let (status, bytes) = self.send(Method::DELETE, url, None).await?;
        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(());
        }
        Err(remote_error(status, &bytes))
    }
}

fn remote_error(status: StatusCode, bytes: &[u8]) -> CalendarError {
    CalendarError::RemoteRequest {
        status: status.as_u16(),
        message: provider_message(bytes),
    }
}

// Calendar errors look like {"error":{"code":400,"message":"..."}}.
fn provider_message(bytes: &[u8]) -> String {
    let raw = || String::from_utf8_lossy(bytes).trim().to_string();
    let Ok(body) = serde_json::from_slice::<Value>(bytes) else {
        return raw();
    };
    match body.get("error") {
        Some(Value::Object(error)) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(raw),
        Some(Value::String(error)) => body
            .get("error_description")
            .and_then(Value::as_str)
            .map(|d| format!("{error}: {d}"))
            .unwrap_or_else(|| error.clone()),
        _ => raw(),
    }
}
