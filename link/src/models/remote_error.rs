use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Error payload delivered by the transport, either on an `error` stream
/// event or as the rejection of a start call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    #[serde(default)]
    pub message: String,

    /// Optional structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Error with only a code.
    pub fn code(code: impl Into<String>) -> Self {
        Self::new(code, String::new())
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "[{}]", self.code)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}
