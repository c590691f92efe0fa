//! # relay-link
//!
//! Client-side subscription streaming core.
//!
//! A [`Transport`] pushes events for a subscription whenever the host has
//! them; callers pull them in order, one at a time, through a
//! [`Subscription`]. In between sits a per-subscription mailbox that buffers
//! values nobody asked for yet and parks callers that asked before anything
//! arrived.
//!
//! - Ordered delivery with an unbounded buffer and FIFO waiters
//! - Termination via [`Subscription::terminate`], drop, or a
//!   [`CancellationToken`]
//! - Optional auto-reconnect with exponential backoff and jitter, resuming
//!   after the last delivered [`ResumeMarker`]
//! - Callback-driven consumption via [`consume()`]
//!
//! ## Module Structure
//!
//! - [`client`]: [`RelayLinkClient`] and its builder
//! - [`subscription`]: the pull handle and the channel behind it
//! - [`consume`]: callback-driven consumption
//! - [`transport`]: the transport contract and [`MemoryTransport`]
//! - [`models`]: events, identifiers, options and snapshots
//! - [`event_handlers`]: lifecycle hooks
//! - [`timeouts`]: bounds on transport control calls
//! - [`error`]: [`RelayLinkError`]

pub mod client;
pub mod consume;
pub mod error;
pub mod event_handlers;
pub mod models;
pub mod subscription;
pub mod timeouts;
pub mod transport;

// Re-export commonly used types
pub use client::{RelayLinkClient, RelayLinkClientBuilder};
pub use consume::{consume, ConsumeCallbacks, ConsumeHandle, FinishReason};
pub use error::{RelayLinkError, Result};
pub use event_handlers::{
    ConnectInfo, ConnectionError, DisconnectReason, EventHandlers, ReconnectAttempt,
};
pub use models::{
    ReconnectPolicy, RemoteError, ResumeMarker, SubscribeRequest, SubscriptionInfo,
    SubscriptionOptions, SubscriptionStatus, TransportEvent, TransportId,
};
pub use subscription::{Pull, Subscription, SubscriptionChannel};
pub use timeouts::{RelayLinkTimeouts, RelayLinkTimeoutsBuilder};
pub use tokio_util::sync::CancellationToken;
pub use transport::{EventListener, ListenerRegistration, MemoryTransport, Transport};
