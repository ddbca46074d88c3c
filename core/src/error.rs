use serde_json::{Value, json};
use thiserror::Error;

pub type Result<T, E = CalendarError> = std::result::Result<T, E>;

/// Error codes surfaced to tool callers. Stable, machine-readable.
pub mod codes {
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const REMOTE_REQUEST_ERROR: &str = "remote_request_error";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const PROTOCOL_ERROR: &str = "protocol_error";
}

/// Every fallible operation in the calendar services returns this error.
///
/// Configuration errors abort startup. Everything else is scoped to the
/// single call that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CalendarError {
    /// Client secret descriptor missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No usable credential could be obtained, or the provider rejected it.
    #[error("authorization error: {0}")]
    Authorization(String),

    /// Tool arguments did not match the declared schema.
    #[error("validation failed for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The provider answered with a non-success status. `message` is the
    /// provider's own text.
    #[error("provider rejected request ({status}): {message}")]
    RemoteRequest { status: u16, message: String },

    /// The provider could not be reached at all.
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl CalendarError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => codes::CONFIGURATION_ERROR,
            Self::Authorization(_) => codes::AUTHORIZATION_ERROR,
            Self::Validation { .. } => codes::VALIDATION_FAILED,
            Self::UnknownTool(_) => codes::UNKNOWN_TOOL,
            Self::RemoteRequest { .. } => codes::REMOTE_REQUEST_ERROR,
            Self::Connection(_) => codes::CONNECTION_ERROR,
            Self::Protocol(_) => codes::PROTOCOL_ERROR,
        }
    }

    /// Field that caused a validation failure, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    fn docs_hint(&self) -> Option<&'static str> {
        match self {
            Self::Configuration(_) => Some(
                "Point CREDENTIALS_PATH at an OAuth client descriptor with a 'web' or 'installed' section.",
            ),
            Self::Authorization(_) => Some("Run `gcal login` to grant calendar access again."),
            Self::Validation { .. } => Some("Call tools/list to see the input schema for this tool."),
            Self::UnknownTool(_) => Some("Call tools/list for the available tool names."),
            Self::Connection(_) => Some("Check network access to the calendar provider."),
            Self::RemoteRequest { .. } | Self::Protocol(_) => None,
        }
    }

    /// Structured payload for tool callers.
    pub fn to_value(&self) -> Value {
        let message = match self {
            Self::Configuration(msg)
            | Self::Authorization(msg)
            | Self::Connection(msg)
            | Self::Protocol(msg) => msg.clone(),
            Self::Validation { message, .. } => message.clone(),
            Self::UnknownTool(name) => format!("Unknown tool: {name}"),
            Self::RemoteRequest { message, .. } => message.clone(),
        };
        let mut payload = json!({
            "error": self.code(),
            "message": message,
        });
        if let Some(field) = self.field() {
            payload["field"] = Value::String(field.to_string());
        }
        if let Self::RemoteRequest { status, .. } = self {
            payload["status"] = json!(status);
        }
        if let Some(hint) = self.docs_hint() {
            payload["docs_hint"] = Value::String(hint.to_string());
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_payload_names_the_field() {
        let err = CalendarError::validation("event", "Missing required field 'event'");
        let payload = err.to_value();
        assert_eq!(payload["error"], "validation_failed");
        assert_eq!(payload["field"], "event");
        assert_eq!(payload["message"], "Missing required field 'event'");
    }

    #[test]
    fn remote_request_payload_keeps_provider_status_and_message() {
        let err = CalendarError::RemoteRequest {
            status: 404,
            message: "Not Found".to_string(),
        };
        let payload = err.to_value();
        assert_eq!(payload["error"], "remote_request_error");
        assert_eq!(payload["status"], 404);
        assert_eq!(payload["message"], "Not Found");
        assert!(payload.get("field").is_none());
    }
}
