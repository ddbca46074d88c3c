use std::sync::Arc;
use std::time::Instant;

use gcal_core::calendar::{DateRange, EventDraft};
use gcal_core::{CalendarError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calendar::CalendarApi;
use crate::tools::{ToolName, ToolRegistry};

/// One text block of a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ContentBlock>,
}

impl ToolCallResult {
    fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
        }
    }

    fn json<T: Serialize>(value: &T) -> Result<Self> {
        let text = serde_json::to_string(value).map_err(|e| {
            CalendarError::Protocol(format!("Failed to serialize tool result: {e}"))
        })?;
        Ok(Self::text(text))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCalendarsArgs {
    page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEventsArgs {
    calendar_id: String,
    starts_at: String,
    ends_at: String,
    page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventArgs {
    calendar_id: String,
    event: EventDraft,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRefArgs {
    calendar_id: String,
    event_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditEventArgs {
    calendar_id: String,
    event_id: String,
    event: EventDraft,
}

/// Routes `(name, arguments)` to the calendar operation behind it.
/// Arguments are validated before anything leaves the process.
pub struct Dispatcher {
    registry: ToolRegistry,
    calendar: Arc<dyn CalendarApi>,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, calendar: Arc<dyn CalendarApi>) -> Self {
        Self { registry, calendar }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub async fn dispatch(&self, name: &str, arguments: Value) -> Result<ToolCallResult> {
        let tool =
            ToolName::parse(name).ok_or_else(|| CalendarError::UnknownTool(name.to_string()))?;
        let args = Value::Object(self.registry.get(tool).validate(&arguments)?);

        let started = Instant::now();
        let result = self.run(tool, args).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(tool = name, elapsed_ms, "tool call completed"),
            Err(e) => tracing::warn!(
                tool = name,
                elapsed_ms,
                error_code = e.code(),
                error = %e,
                "tool call failed"
            ),
        }
        result
    }

    async fn run(&self, tool: ToolName, args: Value) -> Result<ToolCallResult> {
        match tool {
            ToolName::ListCalendars => {
                let args: ListCalendarsArgs = parse_args(args)?;
                let page = self
                    .calendar
                    .list_calendars(args.page_token.as_deref())
                    .await?;
                ToolCallResult::json(&page)
            }
            ToolName::ListCalendarEvents => {
                let args: ListEventsArgs = parse_args(args)?;
                let range = DateRange::parse(&args.starts_at, &args.ends_at, "startsAt", "endsAt")?;
                let page = self
                    .calendar
                    .list_events(&args.calendar_id, range, args.page_token.as_deref())
                    .await?;
                ToolCallResult::json(&page)
            }
            ToolName::CreateCalendarEvent => {
                let args: CreateEventArgs = parse_args(args)?;
                args.event.check_dates("event")?;
                let event = self
                    .calendar
                    .create_event(&args.calendar_id, &args.event)
                    .await?;
                ToolCallResult::json(&event)
            }
            ToolName::GetCalendarEvent => {
                let args: EventRefArgs = parse_args(args)?;
                let event = self
                    .calendar
                    .get_event(&args.calendar_id, &args.event_id)
                    .await?;
                ToolCallResult::json(&event)
            }
            ToolName::EditCalendarEvent => {
                let args: EditEventArgs = parse_args(args)?;
                args.event.check_dates("event")?;
                let event = self
                    .calendar
                    .update_event(&args.calendar_id, &args.event_id, &args.event)
                    .await?;
                ToolCallResult::json(&event)
            }
            ToolName::DeleteCalendarEvent => {
                let args: EventRefArgs = parse_args(args)?;
                self.calendar
                    .delete_event(&args.calendar_id, &args.event_id)
                    .await?;
                Ok(ToolCallResult::text("Event deleted"))
            }
        }
    }
}

// Only reached with arguments the validator accepted.
fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| CalendarError::validation("arguments", format!("Invalid arguments: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_support::RecordingCalendar;

    fn dispatcher() -> (Dispatcher, Arc<RecordingCalendar>) {
        let calendar = Arc::new(RecordingCalendar::default());
        (
            Dispatcher::new(ToolRegistry::new(), calendar.clone()),
            calendar,
        )
    }

    fn draft() -> Value {
        json!({
            "summary": "Launch",
            "description": "Ship it",
            "start": "2024-09-10",
            "end": "2024-09-10"
        })
    }

    #[tokio::test]
    async fn create_without_event_never_reaches_the_provider() {
        let (dispatcher, calendar) = dispatcher();
        let err = dispatcher
            .dispatch("create_calendar_event", json!({"calendarId": "primary"}))
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("event"));
        assert_eq!(err.code(), "validation_failed");
        assert!(calendar.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_by_name() {
        let (dispatcher, calendar) = dispatcher();
        let err = dispatcher.dispatch("not_a_tool", json!({})).await.unwrap_err();
        assert_eq!(err, CalendarError::UnknownTool("not_a_tool".to_string()));
        assert!(calendar.calls().is_empty());
    }

    #[tokio::test]
    async fn every_tool_is_routed() {
        let (dispatcher, calendar) = dispatcher();
        let ev = json!({"calendarId": "primary", "eventId": "e1"});

        dispatcher.dispatch("list_calendars", json!({})).await.unwrap();
        dispatcher
            .dispatch(
                "list_calendar_events",
                json!({"calendarId": "primary", "startsAt": "2024-01-01", "endsAt": "2024-01-31"}),
            )
            .await
            .unwrap();
        dispatcher
            .dispatch(
                "create_calendar_event",
                json!({"calendarId": "primary", "event": draft()}),
            )
            .await
            .unwrap();
        dispatcher.dispatch("get_calendar_event", ev.clone()).await.unwrap();
        dispatcher
            .dispatch(
                "edit_calendar_event",
                json!({"calendarId": "primary", "eventId": "e1", "event": draft()}),
            )
            .await
            .unwrap();
        dispatcher.dispatch("delete_calendar_event", ev).await.unwrap();

        assert_eq!(
            calendar.calls(),
            [
                "list_calendars None",
                "list_events primary 2024-01-01T00:00:00+00:00 2024-02-01T00:00:00+00:00 None",
                "create_event primary Launch",
                "get_event primary e1",
                "update_event primary e1 Launch",
                "delete_event primary e1",
            ]
        );
    }

    #[tokio::test]
    async fn results_are_serialized_into_one_text_block() {
        let (dispatcher, _) = dispatcher();
        let result = dispatcher
            .dispatch(
                "get_calendar_event",
                json!({"calendarId": "primary", "eventId": "e7"}),
            )
            .await
            .unwrap();
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.content[0].kind, "text");
        let body: Value = serde_json::from_str(&result.content[0].text).unwrap();
        assert_eq!(body["id"], "e7");
    }

    #[tokio::test]
    async fn delete_returns_a_fixed_message() {
        let (dispatcher, _) = dispatcher();
        let result = dispatcher
            .dispatch(
                "delete_calendar_event",
                json!({"calendarId": "primary", "eventId": "e1"}),
            )
            .await
            .unwrap();
        assert_eq!(result, ToolCallResult::text("Event deleted"));
    }

    #[tokio::test]
    async fn malformed_dates_are_rejected_before_the_remote_call() {
        let (dispatcher, calendar) = dispatcher();
        let err = dispatcher
            .dispatch(
                "list_calendar_events",
                json!({"calendarId": "primary", "startsAt": "2024-13-01", "endsAt": "2024-12-31"}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("startsAt"));

        let mut backwards = draft();
        backwards["end"] = json!("2024-09-01");
        let err = dispatcher
            .dispatch(
                "edit_calendar_event",
                json!({"calendarId": "primary", "eventId": "e1", "event": backwards}),
            )
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("event.end"));
        assert!(calendar.calls().is_empty());
    }

    #[test]
    fn tool_result_serializes_with_type_tag() {
        let value = serde_json::to_value(ToolCallResult::text("Event deleted")).unwrap();
        assert_eq!(
            value,
            json!({"content": [{"type": "text", "text": "Event deleted"}]})
        );
    }
}
