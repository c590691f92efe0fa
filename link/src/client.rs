//! Main relay-link client with builder pattern.
//!
//! Provides the entry points for opening subscriptions over a
//! [`Transport`] and inspecting the ones that are live.

use crate::{
    consume::{self, ConsumeCallbacks, ConsumeHandle},
    error::{RelayLinkError, Result},
    event_handlers::{ConnectInfo, ConnectionError, EventHandlers},
    models::{SubscriptionInfo, SubscriptionOptions},
    subscription::{
        LinkContext, ReconnectController, Subscription, SubscriptionRegistry, SubscriptionState,
        TransportBinding,
    },
    timeouts::RelayLinkTimeouts,
    transport::Transport,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Main relay-link client.
///
/// Use [`RelayLinkClientBuilder`] to construct instances. Cheap to clone;
/// clones share the transport and the subscription registry.
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
///     .subscribe(
///         "chat.messages",
///         json!({ "room": "general" }),
///         SubscriptionOptions::new().with_auto_reconnect(true),
///     )
///     .await?;
///
/// while let Some(message) = subscription.next().await {
///     println!("{:?}", message);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RelayLinkClient {
    context: LinkContext,
}

impl RelayLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> RelayLinkClientBuilder {
        RelayLinkClientBuilder::new()
    }

    /// Open a subscription to `path` with `input`.
    ///
    /// Registers the event listener, issues the start call and returns once
    /// the transport accepted it. A failed start call is returned as the
    /// error and leaves nothing behind.
    ///
    /// If the stream completes or fails before the start call returns, the
    /// subscription is still returned and yields what arrived followed by
    /// that outcome. With auto-reconnect, a stream error at that point is
    /// retried like any later one.
    ///
    /// With a cancellation token in `options`, cancelling it terminates the
    /// subscription. A token that is already cancelled fails with
    /// [`RelayLinkError::Cancelled`] before anything is started.
    pub async fn subscribe(
        &self,
        path: impl Into<String>,
        input: JsonValue,
        options: SubscriptionOptions,
    ) -> Result<Subscription> {
        let path = path.into();
        if path.trim().is_empty() {
            return Err(RelayLinkError::ConfigurationError(
                "subscription path must not be empty".into(),
            ));
        }

        let SubscriptionOptions {
            resume_marker,
            cancellation_token,
            reconnect,
        } = options;
        if cancellation_token.as_ref().is_some_and(|token| token.is_cancelled()) {
            return Err(RelayLinkError::Cancelled);
        }

        let (failures_tx, failures_rx) = if reconnect.auto_reconnect {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let subscription_id = format!("sub_{}", Uuid::new_v4().simple());
        let state = SubscriptionState::new(
            subscription_id,
            path,
            input,
            reconnect,
            resume_marker,
            self.context.clone(),
            failures_tx,
        );

        let attempt = state.begin_attempt().ok_or_else(|| {
            RelayLinkError::InternalError("subscription closed before its first start".into())
        })?;
        let transport_id = attempt.transport_id.clone();
        let binding = match TransportBinding::establish(
            &state,
            attempt.generation,
            attempt.transport_id,
            attempt.resume_marker,
        )
        .await
        {
            Ok(binding) => binding,
            Err(e) => {
                log::warn!(
                    "[relay-link] Failed to start subscription to {}: {}",
                    state.path(),
                    e
                );
                self.context.handlers.emit_error(ConnectionError::new(
                    format!("Failed to subscribe to {}: {}", state.path(), e),
                    false,
                ));
                return Err(e);
            },
        };

        let context = &self.context;
        if cancellation_token.as_ref().is_some_and(|token| token.is_cancelled()) {
            binding
                .release(context.transport.as_ref(), &context.timeouts, &context.handlers)
                .await;
            return Err(RelayLinkError::Cancelled);
        }
        let connected = match state.install(attempt.generation, binding) {
            Ok(()) => true,
            Err(orphan) => {
                orphan
                    .release(context.transport.as_ref(), &context.timeouts, &context.handlers)
                    .await;
                // The stream failed or completed before the start call
                // returned. Buffered values and the outcome stay pullable.
                let usable = match state.take_abort_error() {
                    Some(error) => state.hand_over(error),
                    None => state.status().is_final(),
                };
                if !usable {
                    return Err(RelayLinkError::InternalError(
                        "subscription superseded during its first start".into(),
                    ));
                }
                false
            },
        };

        context.registry.insert(&state);
        if connected {
            log::info!(
                "[relay-link] Subscribed {} to {} (transport id {})",
                state.id(),
                state.path(),
                transport_id
            );
            context.handlers.emit_connect(ConnectInfo {
                subscription_id: state.id().to_string(),
                transport_id,
                reconnected: false,
            });
        } else {
            log::info!(
                "[relay-link] First start of {} to {} was cut short ({})",
                state.id(),
                state.path(),
                state.status()
            );
        }

        if let Some(failures) = failures_rx {
            ReconnectController::spawn(state.clone(), failures);
        }
        if let Some(token) = cancellation_token {
            let shutdown = state.shutdown_token();
            let watched = state.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {},
                    _ = token.cancelled() => {
                        log::debug!(
                            "[relay-link] Cancellation requested for subscription {}",
                            watched.id()
                        );
                        watched.terminate().await;
                    },
                }
            });
        }

        Ok(Subscription::new(state))
    }

    /// Subscribe and drive the subscription with callbacks on a background
    /// task. See [`consume`](crate::consume()).
    pub fn consume(
        &self,
        path: impl Into<String>,
        input: JsonValue,
        options: SubscriptionOptions,
        callbacks: ConsumeCallbacks,
    ) -> ConsumeHandle {
        let client = self.clone();
        let path = path.into();
        consume::consume(
            async move { client.subscribe(path, input, options).await },
            callbacks,
        )
    }

    /// Snapshots of every live subscription, oldest first.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.context.registry.snapshot()
    }

    /// Number of subscriptions that have not been terminated.
    pub fn active_subscription_count(&self) -> usize {
        self.context.registry.len()
    }

    /// Get the configured timeouts
    pub fn timeouts(&self) -> &RelayLinkTimeouts {
        &self.context.timeouts
    }

    pub fn event_handlers(&self) -> &EventHandlers {
        &self.context.handlers
    }
}

/// Builder for configuring [`RelayLinkClient`] instances.
pub struct RelayLinkClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    timeouts: RelayLinkTimeouts,
    event_handlers: EventHandlers,
}

impl RelayLinkClientBuilder {
    fn new() -> Self {
        Self {
            transport: None,
            timeouts: RelayLinkTimeouts::default(),
            event_handlers: EventHandlers::default(),
        }
    }

    /// Set the transport that carries subscriptions (required)
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Set an already shared transport
    pub fn transport_arc(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set timeouts for the transport control calls
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use relay_link::{MemoryTransport, RelayLinkClient, RelayLinkTimeouts};
    ///
    /// # fn example() -> relay_link::Result<()> {
    /// let client = RelayLinkClient::builder()
    ///     .transport(MemoryTransport::new())
    ///     .timeouts(RelayLinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: RelayLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set lifecycle event handlers shared by every subscription
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<RelayLinkClient> {
        let transport = self
            .transport
            .ok_or_else(|| RelayLinkError::ConfigurationError("transport is required".into()))?;

        if self.event_handlers.has_any() {
            log::debug!("[relay-link] Client built with lifecycle handlers: {:?}", self.event_handlers);
        }

        Ok(RelayLinkClient {
            context: LinkContext {
                transport,
                timeouts: self.timeouts,
                handlers: self.event_handlers,
                registry: SubscriptionRegistry::default(),
            },
        })
    }
}
