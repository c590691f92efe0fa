use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::resume_marker::ResumeMarker;
use super::transport_id::TransportId;

/// Start command handed to [`Transport::subscribe`](crate::Transport::subscribe).
///
/// Serializable so wire transports can forward it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Transport-level id the host must tag its push events with
    pub transport_id: TransportId,

    /// Procedure path of the subscription
    pub path: String,

    /// Input payload of the subscription
    pub input: JsonValue,

    /// Resume after this position instead of from the beginning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_marker: Option<ResumeMarker>,
}
