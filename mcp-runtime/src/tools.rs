//! Declared tool surface: names, input contracts and the validator that
//! enforces them.

use gcal_core::{CalendarError, Result};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListCalendars,
    ListCalendarEvents,
    CreateCalendarEvent,
    GetCalendarEvent,
    EditCalendarEvent,
    DeleteCalendarEvent,
}

impl ToolName {
    pub const ALL: [ToolName; 6] = [
        ToolName::ListCalendars,
        ToolName::ListCalendarEvents,
        ToolName::CreateCalendarEvent,
        ToolName::GetCalendarEvent,
        ToolName::EditCalendarEvent,
        ToolName::DeleteCalendarEvent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::ListCalendars => "list_calendars",
            ToolName::ListCalendarEvents => "list_calendar_events",
            ToolName::CreateCalendarEvent => "create_calendar_event",
            ToolName::GetCalendarEvent => "get_calendar_event",
            ToolName::EditCalendarEvent => "edit_calendar_event",
            ToolName::DeleteCalendarEvent => "delete_calendar_event",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Boolean,
    Object(&'static [FieldSpec]),
}

impl FieldKind {
    fn type_name(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::Object(_) => "object",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldKind::String, Value::String(_))
                | (FieldKind::Boolean, Value::Bool(_))
                | (FieldKind::Object(_), Value::Object(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub description: &'static str,
}

const fn required(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, kind: FieldKind, description: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        description,
    }
}

const CALENDAR_ID: FieldSpec = required("calendarId", FieldKind::String, "The calendar ID");
const EVENT_ID: FieldSpec = required("eventId", FieldKind::String, "The event ID");
const PAGE_TOKEN: FieldSpec = optional("pageToken", FieldKind::String, "The next page token");

const EVENT_FIELDS: &[FieldSpec] = &[
    required("summary", FieldKind::String, "The summary of the event"),
    required("description", FieldKind::String, "The description of the event"),
    required(
        "start",
        FieldKind::String,
        "The start date of the event. Format: YYYY-MM-DD",
    ),
    required(
        "end",
        FieldKind::String,
        "The end date of the event. Format: YYYY-MM-DD",
    ),
    optional(
        "anyoneCanAddSelf",
        FieldKind::Boolean,
        "Whether anyone can add themselves to the event",
    ),
    optional("colorId", FieldKind::String, "The color of the event"),
];

const EVENT: FieldSpec = required("event", FieldKind::Object(EVENT_FIELDS), "The event");

const LIST_CALENDARS_FIELDS: &[FieldSpec] = &[PAGE_TOKEN];
const LIST_CALENDAR_EVENTS_FIELDS: &[FieldSpec] = &[
    CALENDAR_ID,
    required(
        "startsAt",
        FieldKind::String,
        "The start date of the events. Format: YYYY-MM-DD",
    ),
    required(
        "endsAt",
        FieldKind::String,
        "The end date of the events. Format: YYYY-MM-DD",
    ),
    PAGE_TOKEN,
];
const CREATE_CALENDAR_EVENT_FIELDS: &[FieldSpec] = &[CALENDAR_ID, EVENT];
const EVENT_REF_FIELDS: &[FieldSpec] = &[CALENDAR_ID, EVENT_ID];
const EDIT_CALENDAR_EVENT_FIELDS: &[FieldSpec] = &[CALENDAR_ID, EVENT_ID, EVENT];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: ToolName,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
}

impl ToolDescriptor {
    pub fn input_schema(&self) -> Value {
        object_schema(self.fields)
    }

    /// The `tools/list` entry for this tool.
    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name.as_str(),
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }

    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>> {
        validate(self.fields, arguments)
    }
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        let mut property = match field.kind {
            FieldKind::Object(nested) => object_schema(nested),
            kind => json!({ "type": kind.type_name() }),
        };
        property["description"] = json!(field.description);
        properties.insert(field.name.to_string(), property);
    }
    let required: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name)
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Fixed, immutable set of the six calendar tools.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        let tools = ToolName::ALL
            .into_iter()
            .map(|name| {
                let (description, fields) = match name {
                    ToolName::ListCalendars => ("List all calendars", LIST_CALENDARS_FIELDS),
                    ToolName::ListCalendarEvents => {
                        ("Get events from a calendar", LIST_CALENDAR_EVENTS_FIELDS)
                    }
                    ToolName::CreateCalendarEvent => {
                        ("Create a calendar event", CREATE_CALENDAR_EVENT_FIELDS)
                    }
                    ToolName::GetCalendarEvent => ("Get a calendar event", EVENT_REF_FIELDS),
                    ToolName::EditCalendarEvent => {
                        ("Edit a calendar event", EDIT_CALENDAR_EVENT_FIELDS)
                    }
                    ToolName::DeleteCalendarEvent => ("Delete a calendar event", EVENT_REF_FIELDS),
                };
                ToolDescriptor {
                    name,
                    description,
                    fields,
                }
            })
            .collect();
        Self { tools }
    }

    pub fn get(&self, name: ToolName) -> &ToolDescriptor {
        // Built from ToolName::ALL, so every name has an entry.
        &self.tools[name as usize]
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self.tools.iter().map(ToolDescriptor::to_value).collect();
        json!({ "tools": tools })
    }
}

/// Check `arguments` against `fields` without coercing anything. `null` is
/// not a value of any declared kind; on a required field it reads as missing.
pub fn validate(fields: &[FieldSpec], arguments: &Value) -> Result<Map<String, Value>> {
    match arguments {
        Value::Object(map) => validate_object(fields, map, ""),
        // A tool without required fields may be called with no arguments.
        Value::Null if fields.iter().all(|f| !f.required) => Ok(Map::new()),
        _ => Err(CalendarError::validation(
            "arguments",
            "Tool arguments must be an object",
        )),
    }
}

fn validate_object(
    fields: &[FieldSpec],
    map: &Map<String, Value>,
    prefix: &str,
) -> Result<Map<String, Value>> {
    let path = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        }
    };

    if let Some(unknown) = map.keys().find(|k| !fields.iter().any(|f| f.name == k.as_str())) {
        let field = path(unknown);
        return Err(CalendarError::validation(
            field.clone(),
            format!("Unknown field '{field}'"),
        ));
    }

    let mut out = Map::new();
    for entry in fields {
        let field = path(entry.name);
        let value = match map.get(entry.name) {
            None | Some(Value::Null) if entry.required => {
                return Err(CalendarError::validation(
                    field.clone(),
                    format!("Missing required field '{field}'"),
                ));
            }
            None => continue,
            Some(value) => value,
        };
        if !entry.kind.accepts(value) {
            return Err(CalendarError::validation(
                field.clone(),
                format!("'{field}' must be a {}", entry.kind.type_name()),
            ));
        }
        let value = match (entry.kind, value) {
            (FieldKind::Object(nested), Value::Object(inner)) => {
                Value::Object(validate_object(nested, inner, &field)?)
            }
            _ => value.clone(),
        };
        out.insert(entry.name.to_string(), value);
    }
    Ok(out)
}
