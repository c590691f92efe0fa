//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] provides a read-only snapshot of a live
//! subscription's state, useful for debugging, tests and dashboards.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::resume_marker::ResumeMarker;
use super::transport_id::TransportId;

/// Connection phase of a logical subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Start call in flight
    Connecting,
    /// Receiving events
    Streaming,
    /// Waiting out a backoff delay or re-issuing the start call
    Reconnecting,
    /// The producer ended the stream
    Completed,
    /// The stream ended with an error
    Failed,
    /// Terminated by the consumer or its cancellation token
    Closed,
}

impl SubscriptionStatus {
    /// Whether the subscription will never stream again.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Completed | SubscriptionStatus::Failed | SubscriptionStatus::Closed
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionStatus::Connecting => "connecting",
            SubscriptionStatus::Streaming => "streaming",
            SubscriptionStatus::Reconnecting => "reconnecting",
            SubscriptionStatus::Completed => "completed",
            SubscriptionStatus::Failed => "failed",
            SubscriptionStatus::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of a subscription.
///
/// Returned by [`RelayLinkClient::subscriptions()`](crate::RelayLinkClient::subscriptions)
/// and [`Subscription::info()`](crate::Subscription::info).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Logical subscription id, stable across reconnects.
    pub id: String,
    /// Procedure path.
    pub path: String,
    /// Transport-level id of the live connection, if any.
    pub transport_id: Option<TransportId>,
    /// Marker of the last delivered value.
    pub last_resume_marker: Option<ResumeMarker>,
    /// Consecutive reconnect attempts since the last successful connection.
    pub reconnect_attempts: u32,
    pub status: SubscriptionStatus,
    /// Timestamp (millis since Unix epoch) when the subscription was created.
    pub created_at_ms: u64,
    /// Timestamp (millis since Unix epoch) of the last received event,
    /// or `None` if no events have been received yet.
    pub last_event_time_ms: Option<u64>,
}
