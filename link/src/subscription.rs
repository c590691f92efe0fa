//! Pull-based consumption of a subscription.
//!
//! A [`Subscription`] is returned by
//! [`RelayLinkClient::subscribe`](crate::RelayLinkClient::subscribe). Values
//! pushed by the transport are buffered until pulled with
//! [`next`](Subscription::next); the stream ends on producer completion, on a
//! terminal error, or when the handle is terminated.

mod binding;
mod channel;
mod reconnect;
mod registry;
mod state;

pub use channel::{Pull, SubscriptionChannel};

pub(crate) use binding::TransportBinding;
pub(crate) use reconnect::ReconnectController;
pub(crate) use registry::SubscriptionRegistry;
pub(crate) use state::{LinkContext, SubscriptionState};

use crate::{
    error::{RelayLinkError, Result},
    models::{ResumeMarker, SubscriptionInfo, SubscriptionStatus, TransportId},
};
use futures_util::stream::{self, Stream};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

/// Consumer handle for a single logical subscription.
///
/// # Examples
///
/// ```rust,no_run
/// use relay_link::{MemoryTransport, RelayLinkClient, SubscriptionOptions};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RelayLinkClient::builder()
///     .transport(MemoryTransport::new())
///     .build()?;
///
/// let subscription = client
///     .subscribe("orders.updates", json!({ "region": "eu" }), SubscriptionOptions::new())
///     .await?;
///
/// while let Some(item) = subscription.next().await {
///     match item {
///         Ok(value) => println!("Update: {}", value),
///         Err(e) => eprintln!("Error: {}", e),
///     }
/// }
/// # Ok(())
/// # }
/// ```
///
/// Dropping the handle terminates the subscription; the stop call is then
/// issued in the background.
pub struct Subscription {
    state: Arc<SubscriptionState>,
}

impl Subscription {
    pub(crate) fn new(state: Arc<SubscriptionState>) -> Self {
        Self { state }
    }

    /// Receive the next value.
    ///
    /// Returns `Some(Ok(value))` for each value in delivery order,
    /// `Some(Err(..))` for a stream error and `None` once the stream has ended
    /// or the subscription was terminated. A terminal error is returned again
    /// by every later call.
    ///
    /// Concurrent calls are served in call order.
    pub async fn next(&self) -> Option<Result<JsonValue>> {
        match self.pull().await {
            Pull::Value(value) => Some(Ok(value)),
            Pull::Failed(error) | Pull::Interrupted(error) => {
                Some(Err(RelayLinkError::StreamError(error)))
            },
            Pull::End => None,
        }
    }

    /// Raw pull outcome, keeping interrupted and terminal errors apart.
    pub(crate) async fn pull(&self) -> Pull<JsonValue> {
        self.state.channel.next_value().await
    }

    /// Receive the next value decoded as `T`.
    ///
    /// A value that does not decode yields a `SerializationError` for that
    /// item only; the stream itself continues.
    pub async fn next_as<T: DeserializeOwned>(&self) -> Option<Result<T>> {
        let item = self.next().await?;
        Some(item.and_then(|value| serde_json::from_value(value).map_err(RelayLinkError::from)))
    }

    /// Terminate the subscription.
    ///
    /// Pending and future [`next`](Self::next) calls resolve to `None`,
    /// buffered values are discarded, the listener is unregistered and the
    /// transport is asked to stop. Safe to call multiple times; later calls
    /// are no-ops.
    pub async fn terminate(&self) {
        self.state.terminate().await;
    }

    /// Alias of [`terminate`](Self::terminate). Never fails.
    pub async fn close(&self) -> Result<()> {
        self.terminate().await;
        Ok(())
    }

    /// Convert into a [`Stream`] of values.
    ///
    /// The stream ends after the first terminal error or at end-of-stream.
    /// An error absorbed by auto-reconnect is yielded and the stream
    /// continues with the reconnected values.
    pub fn into_stream(self) -> impl Stream<Item = Result<JsonValue>> + Send + 'static {
        stream::unfold(Some(self), |subscription| async move {
            let subscription = subscription?;
            match subscription.pull().await {
                Pull::Value(value) => Some((Ok(value), Some(subscription))),
                Pull::Interrupted(error) => {
                    Some((Err(RelayLinkError::StreamError(error)), Some(subscription)))
                },
                Pull::Failed(error) => Some((Err(RelayLinkError::StreamError(error)), None)),
                Pull::End => None,
            }
        })
    }

    /// Logical subscription id, stable across reconnects.
    pub fn id(&self) -> &str {
        self.state.id()
    }

    pub fn path(&self) -> &str {
        self.state.path()
    }

    /// Transport-level id of the current (or most recent) connection.
    pub fn transport_id(&self) -> Option<TransportId> {
        self.state.transport_id()
    }

    /// Resume marker of the last delivered value that carried one.
    pub fn last_resume_marker(&self) -> Option<ResumeMarker> {
        self.state.last_resume_marker()
    }

    /// Reconnect attempts since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.reconnect_attempts()
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.state.status()
    }

    /// Whether [`terminate`](Self::terminate) ran, explicitly or through the
    /// cancellation token.
    pub fn is_terminated(&self) -> bool {
        self.state.status() == SubscriptionStatus::Closed
    }

    pub fn info(&self) -> SubscriptionInfo {
        self.state.info()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.state.id())
            .field("path", &self.state.path())
            .field("status", &self.state.status())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.state.terminate_detached();
    }
}
