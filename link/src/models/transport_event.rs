use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::remote_error::RemoteError;
use super::resume_marker::ResumeMarker;

/// Push event delivered by the transport for one transport-level id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportEvent {
    /// A value on the stream
    Data {
        value: JsonValue,

        /// Position of this value, if the transport supports resumption
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume_marker: Option<ResumeMarker>,
    },

    /// The stream failed
    Error { error: RemoteError },

    /// The producer finished the stream
    Completed,
}

impl TransportEvent {
    pub fn data(value: JsonValue) -> Self {
        TransportEvent::Data {
            value,
            resume_marker: None,
        }
    }

    pub fn data_with_marker(value: JsonValue, marker: impl Into<ResumeMarker>) -> Self {
        TransportEvent::Data {
            value,
            resume_marker: Some(marker.into()),
        }
    }

    pub fn error(error: RemoteError) -> Self {
        TransportEvent::Error { error }
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportEvent::Data { .. } => "data",
            TransportEvent::Error { .. } => "error",
            TransportEvent::Completed => "completed",
        }
    }
}
