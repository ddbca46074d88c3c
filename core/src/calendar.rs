use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{CalendarError, Result};

/// Provider event resource, passed through untouched.
pub type Event = Map<String, Value>;

/// Calendar-day format accepted for all date arguments.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One page of `calendarList.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarListPage {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(
        rename = "nextPageToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_page_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One page of `events.list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(
        rename = "nextPageToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub next_page_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Caller-supplied all-day event content. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub summary: String,
    pub description: String,
    pub start: String,
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anyone_can_add_self: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
}

impl EventDraft {
    /// Reject drafts whose dates are not calendar days or run backwards.
    pub fn check_dates(&self, field_prefix: &str) -> Result<()> {
        let start = parse_day(&self.start, &format!("{field_prefix}.start"))?;
        let end = parse_day(&self.end, &format!("{field_prefix}.end"))?;
        if end < start {
            return Err(CalendarError::validation(
                format!("{field_prefix}.end"),
                format!("'{field_prefix}.end' must not be before '{field_prefix}.start'"),
            ));
        }
        Ok(())
    }

    /// Body for `events.insert`: optional fields are left out.
    pub fn to_insert_body(&self) -> Value {
        let mut body = self.base_body();
        if let Some(anyone_can_add_self) = self.anyone_can_add_self {
            body["anyoneCanAddSelf"] = json!(anyone_can_add_self);
        }
        if let Some(color_id) = &self.color_id {
            body["colorId"] = json!(color_id);
        }
        body
    }

    /// Body for `events.update`. Full replace: every mutable field is sent
    /// and absent optional fields are cleared rather than left as they were.
    pub fn to_replace_body(&self) -> Value {
        let mut body = self.base_body();
        body["anyoneCanAddSelf"] = json!(self.anyone_can_add_self.unwrap_or(false));
        body["colorId"] = match &self.color_id {
            Some(color_id) => json!(color_id),
            None => Value::Null,
        };
        body
    }

    fn base_body(&self) -> Value {
        json!({
            "summary": self.summary,
            "description": self.description,
            "start": { "date": self.start },
            "end": { "date": self.end },
        })
    }
}

/// Inclusive range of calendar days, interpreted in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parse `YYYY-MM-DD` bounds; `start_field`/`end_field` name the
    /// arguments in validation errors.
    pub fn parse(start: &str, end: &str, start_field: &str, end_field: &str) -> Result<Self> {
        let start = parse_day(start, start_field)?;
        let end = parse_day(end, end_field)?;
        if end < start {
            return Err(CalendarError::validation(
                end_field,
                format!("'{end_field}' must not be before '{start_field}'"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Lower bound: midnight at the start of the first day.
    pub fn time_min(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Upper bound: midnight after the last day. The provider treats it as
    /// exclusive, so the last day is covered in full.
    pub fn time_max(&self) -> DateTime<Utc> {
        let day_after = self.end.checked_add_days(Days::new(1)).unwrap_or(self.end);
        day_after.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}

fn parse_day(raw: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        CalendarError::validation(
            field,
            format!("'{field}' must be a date in YYYY-MM-DD format, got '{raw}'"),
        )
    })
}
