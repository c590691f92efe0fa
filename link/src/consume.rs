//! Callback-driven consumption of a subscription.
//!
//! [`consume`] drives a [`Subscription`] on a background task and reports
//! every outcome through [`ConsumeCallbacks`]. `on_finish` runs exactly once
//! with the reason the loop stopped.
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_link::{ConsumeCallbacks, MemoryTransport, RelayLinkClient, SubscriptionOptions};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RelayLinkClient::builder()
//!     .transport(MemoryTransport::new())
//!     .build()?;
//!
//! let callbacks = ConsumeCallbacks::new()
//!     .on_value(|value| println!("Update: {}", value))
//!     .on_error(|error| eprintln!("Error: {}", error))
//!     .on_finish(|reason| println!("Finished: {}", reason));
//!
//! let handle = client.consume("prices", json!({}), SubscriptionOptions::new(), callbacks);
//! // ...
//! handle.cancel();
//! handle.join().await;
//! # Ok(())
//! # }
//! ```

use crate::{
    error::{RelayLinkError, Result},
    subscription::{Pull, Subscription},
};
use serde_json::Value as JsonValue;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why a consumption loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The producer completed the stream.
    Success,
    /// The subscription could not be started or failed for good.
    Error,
    /// [`ConsumeHandle::cancel`] was called.
    Cancelled,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinishReason::Success => "success",
            FinishReason::Error => "error",
            FinishReason::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

pub type OnValueCallback = Arc<dyn Fn(JsonValue) + Send + Sync>;
pub type OnConsumeErrorCallback = Arc<dyn Fn(RelayLinkError) + Send + Sync>;
pub type OnCompleteCallback = Arc<dyn Fn() + Send + Sync>;
pub type OnFinishCallback = Arc<dyn Fn(FinishReason) + Send + Sync>;

/// Hooks invoked by [`consume`]. All are optional.
#[derive(Clone, Default)]
pub struct ConsumeCallbacks {
    on_value: Option<OnValueCallback>,
    on_error: Option<OnConsumeErrorCallback>,
    on_complete: Option<OnCompleteCallback>,
    on_finish: Option<OnFinishCallback>,
}

impl fmt::Debug for ConsumeCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumeCallbacks")
            .field("on_value", &self.on_value.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

impl ConsumeCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called for every value, in delivery order.
    pub fn on_value(mut self, f: impl Fn(JsonValue) + Send + Sync + 'static) -> Self {
        self.on_value = Some(Arc::new(f));
        self
    }

    /// Called for a start failure, a terminal stream error, and every stream
    /// error absorbed by auto-reconnect.
    pub fn on_error(mut self, f: impl Fn(RelayLinkError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Called when the producer completes the stream.
    pub fn on_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Called exactly once when consumption stops.
    pub fn on_finish(mut self, f: impl Fn(FinishReason) + Send + Sync + 'static) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }

    fn value(&self, value: JsonValue) {
        if let Some(cb) = &self.on_value {
            cb(value);
        }
    }

    fn error(&self, error: RelayLinkError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    fn complete(&self) {
        if let Some(cb) = &self.on_complete {
            cb();
        }
    }

    fn finish(&self, reason: FinishReason) {
        if let Some(cb) = &self.on_finish {
            cb(reason);
        }
    }
}

/// Handle of a running [`consume`] loop.
///
/// Dropping the handle does not stop the loop; call
/// [`cancel`](Self::cancel) for that.
pub struct ConsumeHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsumeHandle {
    /// Stop consuming and terminate the subscription.
    ///
    /// Safe to call multiple times. Has no effect once the loop already
    /// finished on its own.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the loop has stopped and `on_finish` has run.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to stop.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            log::warn!("[relay-link] Consume task ended abnormally: {}", e);
        }
    }
}

impl fmt::Debug for ConsumeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumeHandle")
            .field("cancelled", &self.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Drive the subscription produced by `subscribe` until it ends or the
/// returned handle is cancelled.
///
/// Must be called within a tokio runtime.
pub fn consume<F>(subscribe: F, callbacks: ConsumeCallbacks) -> ConsumeHandle
where
    F: Future<Output = Result<Subscription>> + Send + 'static,
{
    let token = CancellationToken::new();
    let task = tokio::spawn(run(subscribe, callbacks, token.clone()));
    ConsumeHandle { token, task }
}

enum Setup {
    Cancelled,
    Settled(Result<Subscription>),
}

async fn run<F>(subscribe: F, callbacks: ConsumeCallbacks, token: CancellationToken)
where
    F: Future<Output = Result<Subscription>> + Send + 'static,
{
    tokio::pin!(subscribe);
    let setup = tokio::select! {
        biased;
        _ = token.cancelled() => Setup::Cancelled,
        result = &mut subscribe => Setup::Settled(result),
    };

    let subscription = match setup {
        Setup::Settled(Ok(subscription)) => subscription,
        Setup::Settled(Err(e)) => {
            callbacks.error(e);
            callbacks.finish(FinishReason::Error);
            return;
        },
        Setup::Cancelled => {
            // The start call may already be in flight; let it settle so the
            // stream can be stopped.
            if let Ok(subscription) = subscribe.await {
                subscription.terminate().await;
            }
            callbacks.finish(FinishReason::Cancelled);
            return;
        },
    };

    let reason = drive(&subscription, &callbacks, &token).await;
    subscription.terminate().await;
    log::debug!(
        "[relay-link] Consumption of {} finished: {}",
        subscription.id(),
        reason
    );
    callbacks.finish(reason);
}

async fn drive(
    subscription: &Subscription,
    callbacks: &ConsumeCallbacks,
    token: &CancellationToken,
) -> FinishReason {
    loop {
        let pulled = tokio::select! {
            biased;
            _ = token.cancelled() => return FinishReason::Cancelled,
            pulled = subscription.pull() => pulled,
        };
        match pulled {
            Pull::Value(value) => callbacks.value(value),
            Pull::Interrupted(error) => callbacks.error(RelayLinkError::StreamError(error)),
            Pull::Failed(error) => {
                callbacks.error(RelayLinkError::StreamError(error));
                return FinishReason::Error;
            },
            Pull::End => {
                // End without completion means the subscription was
                // terminated from elsewhere, e.g. its cancellation token.
                if token.is_cancelled() || subscription.is_terminated() {
                    return FinishReason::Cancelled;
                }
                callbacks.complete();
                return FinishReason::Success;
            },
        }
    }
}
