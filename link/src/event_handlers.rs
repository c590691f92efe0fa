//! Subscription lifecycle event handlers.
//!
//! Provides callback-based hooks for monitoring subscriptions:
//!
//! - [`on_connect`](EventHandlers::on_connect): a start call succeeded (initial or reconnect)
//! - [`on_disconnect`](EventHandlers::on_disconnect): a subscription was terminated or lost its stream
//! - [`on_reconnect`](EventHandlers::on_reconnect): a reconnect attempt is scheduled
//! - [`on_error`](EventHandlers::on_error): stream errors, failed attempts, ignored cleanup failures
//! - [`on_receive`](EventHandlers::on_receive): optional debug hook for every transport event
//!
//! # Example
//!
//! ```rust,no_run
//! use relay_link::{EventHandlers, MemoryTransport, RelayLinkClient};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handlers = EventHandlers::new()
//!     .on_connect(|info| println!("Streaming {} via {}", info.subscription_id, info.transport_id))
//!     .on_reconnect(|attempt| println!("Retrying in {:?}", attempt.delay))
//!     .on_error(|error| eprintln!("Subscription error: {}", error));
//!
//! let client = RelayLinkClient::builder()
//!     .transport(MemoryTransport::new())
//!     .event_handlers(handlers)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::models::{RemoteError, TransportEvent, TransportId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Passed to `on_connect` after a successful start call.
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    pub subscription_id: String,
    pub transport_id: TransportId,
    /// `true` when this connection replaced a failed one.
    pub reconnected: bool,
}

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    pub subscription_id: String,
    /// Human-readable description of why the stream ended.
    pub message: String,
}

impl DisconnectReason {
    pub fn new(subscription_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subscription_id, self.message)
    }
}

/// A scheduled reconnect attempt.
#[derive(Debug, Clone)]
pub struct ReconnectAttempt {
    pub subscription_id: String,
    /// 1-based attempt number since the last successful connection.
    pub attempt: u32,
    /// Backoff delay chosen for this attempt, jitter included.
    pub delay: Duration,
    /// The stream error that triggered reconnection.
    pub error: RemoteError,
}

/// Error information passed to the `on_error` handler.
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Human-readable error message.
    pub message: String,
    /// Whether this error is recoverable (i.e. auto-reconnect may succeed).
    pub recoverable: bool,
}

impl ConnectionError {
    /// Create a new connection error.
    pub fn new(message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            message: message.into(),
            recoverable,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Type alias for the on_connect callback.
pub type OnConnectCallback = Arc<dyn Fn(ConnectInfo) + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type OnDisconnectCallback = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

/// Type alias for the on_reconnect callback.
pub type OnReconnectCallback = Arc<dyn Fn(ReconnectAttempt) + Send + Sync>;

/// Type alias for the on_error callback.
pub type OnErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

/// Type alias for the on_receive callback (debug hook for all transport events).
pub type OnReceiveCallback = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// Subscription lifecycle event handlers.
///
/// All handlers are optional. Handlers are `Send + Sync` and are invoked
/// from whichever task observed the event, never while internal locks are
/// held.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pub(crate) on_connect: Option<OnConnectCallback>,
    pub(crate) on_disconnect: Option<OnDisconnectCallback>,
    pub(crate) on_reconnect: Option<OnReconnectCallback>,
    pub(crate) on_error: Option<OnErrorCallback>,
    pub(crate) on_receive: Option<OnReceiveCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.is_some())
            .field("on_disconnect", &self.on_disconnect.is_some())
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_receive", &self.on_receive.is_some())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked after every successful start call.
    ///
    /// # Example
    /// ```rust
    /// use relay_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_connect(|info| println!("Connected (reconnected={})", info.reconnected));
    /// ```
    pub fn on_connect(mut self, f: impl Fn(ConnectInfo) + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when a subscription stops streaming.
    pub fn on_disconnect(mut self, f: impl Fn(DisconnectReason) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked before each reconnect backoff wait.
    pub fn on_reconnect(mut self, f: impl Fn(ReconnectAttempt) + Send + Sync + 'static) -> Self {
        self.on_reconnect = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked when an error occurs.
    ///
    /// The callback receives a [`ConnectionError`] indicating whether the
    /// error is recoverable (auto-reconnect may help) or fatal. Failures of
    /// the best-effort stop call are reported here too, since cleanup never
    /// returns them.
    ///
    /// # Example
    /// ```rust
    /// use relay_link::EventHandlers;
    ///
    /// let handlers = EventHandlers::new()
    ///     .on_error(|err| eprintln!("Error (recoverable={}): {}", err.recoverable, err));
    /// ```
    pub fn on_error(mut self, f: impl Fn(ConnectionError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Register a callback invoked for every transport event routed to a
    /// subscription, before it is applied. Debug/tracing hook.
    pub fn on_receive(mut self, f: impl Fn(&TransportEvent) + Send + Sync + 'static) -> Self {
        self.on_receive = Some(Arc::new(f));
        self
    }

    /// Returns `true` if any handler is registered.
    pub fn has_any(&self) -> bool {
        self.on_connect.is_some()
            || self.on_disconnect.is_some()
            || self.on_reconnect.is_some()
            || self.on_error.is_some()
            || self.on_receive.is_some()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    pub(crate) fn emit_connect(&self, info: ConnectInfo) {
        if let Some(cb) = &self.on_connect {
            cb(info);
        }
    }

    pub(crate) fn emit_disconnect(&self, reason: DisconnectReason) {
        if let Some(cb) = &self.on_disconnect {
            cb(reason);
        }
    }

    pub(crate) fn emit_reconnect(&self, attempt: ReconnectAttempt) {
        if let Some(cb) = &self.on_reconnect {
            cb(attempt);
        }
    }

    pub(crate) fn emit_error(&self, error: ConnectionError) {
        if let Some(cb) = &self.on_error {
            cb(error);
        }
    }

    pub(crate) fn emit_receive(&self, event: &TransportEvent) {
        if let Some(cb) = &self.on_receive {
            cb(event);
        }
    }
}
